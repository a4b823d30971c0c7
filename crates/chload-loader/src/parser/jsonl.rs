//! JSON Lines staged files
//!
//! One object per record. Columns appear in first-seen order across the file;
//! keys missing from a record become nulls.

use async_trait::async_trait;
use serde_json::{Map, Value as Json};
use serde_jsonlines::JsonLinesReader;

use super::StagedParser;
use crate::error::{LoaderError, Result};
use crate::table::{Table, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesParser;

#[async_trait]
impl StagedParser for JsonLinesParser {
    fn file_type(&self) -> &str {
        "jsonl"
    }

    fn parse_file(&self, source: &str, data: &[u8]) -> Result<Table> {
        let mut objects: Vec<Map<String, Json>> = Vec::new();
        let mut columns: Vec<String> = Vec::new();

        for (index, item) in JsonLinesReader::new(data).read_all::<Json>().enumerate() {
            let item = item
                .map_err(|e| LoaderError::parse(source, format!("record {}: {}", index + 1, e)))?;
            let Json::Object(object) = item else {
                return Err(LoaderError::parse(
                    source,
                    format!("record {}: expected a JSON object", index + 1),
                ));
            };
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
            objects.push(object);
        }

        let mut table = Table::new(columns.clone());
        for mut object in objects {
            let row = columns
                .iter()
                .map(|c| object.remove(c).map(Value::from_json).unwrap_or(Value::Null))
                .collect();
            table.push_row(row)?;
        }

        Ok(table)
    }
}
