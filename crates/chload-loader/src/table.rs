//! In-memory tabular data handed from parsers to sinks

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};

use crate::error::{LoaderError, Result};

/// Default name of the provenance column stamped onto every row
pub const DEFAULT_PROVENANCE_COLUMN: &str = "etl_time";

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    /// Nested arrays and objects, passed through untouched
    Json(Json),
}

/// How a sink wants timestamps rendered in JSON payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampStyle {
    /// `2026-10-19T08:15:00.000000Z`
    Rfc3339,
    /// `2026-10-19 08:15:00.000000`, accepted by ClickHouse `DateTime64`
    SpaceSeparated,
}

impl Value {
    /// Convert a JSON scalar or container into a cell
    pub fn from_json(value: Json) -> Self {
        match value {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            Json::String(s) => Value::String(s),
            other => Value::Json(other),
        }
    }

    /// Infer a cell from a raw text field (CSV and similar)
    ///
    /// Numbers are only recognized when their canonical rendering is the
    /// raw text itself, so `00501`, `+7` or `1e3` stay strings.
    pub fn infer(raw: &str) -> Self {
        if raw.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = raw.parse::<i64>() {
            if i.to_string() == raw {
                return Value::Int(i);
            }
        }
        if raw.contains('.') {
            if let Ok(f) = raw.parse::<f64>() {
                if f.is_finite() && f.to_string() == raw {
                    return Value::Float(f);
                }
            }
        }
        match raw {
            "true" | "TRUE" | "True" => Value::Bool(true),
            "false" | "FALSE" | "False" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        }
    }

    pub fn to_json(&self, style: TimestampStyle) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Timestamp(ts) => Json::String(match style {
                TimestampStyle::Rfc3339 => ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
                TimestampStyle::SpaceSeparated => ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            }),
            Value::Json(v) => v.clone(),
        }
    }
}

/// Column names plus row-major cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(LoaderError::Schema(format!(
                "row has {} values but table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Remove a column; returns whether it was present
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Append a column holding `value` on every row, replacing any column of that name
    pub fn set_constant_column(&mut self, name: &str, value: Value) {
        self.drop_column(name);
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.clone());
        }
    }

    /// Stamp the load-start time as provenance; repeat calls keep one column
    pub fn stamp_provenance(&mut self, column: &str, started_at: DateTime<Utc>) {
        self.set_constant_column(column, Value::Timestamp(started_at));
    }

    /// Append `other`'s rows, aligning columns by name
    ///
    /// Columns only present on one side are filled with nulls on the other.
    pub fn concat(mut self, other: Table) -> Table {
        for column in &other.columns {
            if self.column_index(column).is_none() {
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.push(Value::Null);
                }
            }
        }

        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|c| other.column_index(c))
            .collect();

        for mut row in other.rows {
            let aligned = mapping
                .iter()
                .map(|idx| match idx {
                    Some(i) => std::mem::replace(&mut row[*i], Value::Null),
                    None => Value::Null,
                })
                .collect();
            self.rows.push(aligned);
        }

        self
    }

    /// Rows as JSON objects keyed by column name
    pub fn row_objects<'a>(
        &'a self,
        rows: &'a [Vec<Value>],
        style: TimestampStyle,
    ) -> impl Iterator<Item = Map<String, Json>> + 'a {
        rows.iter().map(move |row| {
            self.columns
                .iter()
                .zip(row)
                .map(|(name, value)| (name.clone(), value.to_json(style)))
                .collect()
        })
    }
}
