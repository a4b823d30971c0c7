//! CSV staged files (header row required)

use async_trait::async_trait;

use super::StagedParser;
use crate::error::{LoaderError, Result};
use crate::table::{Table, Value};

#[derive(Debug, Clone)]
pub struct CsvParser {
    delimiter: u8,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvParser {
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

#[async_trait]
impl StagedParser for CsvParser {
    fn file_type(&self) -> &str {
        "csv"
    }

    fn parse_file(&self, source: &str, data: &[u8]) -> Result<Table> {
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_reader(data);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| LoaderError::parse(source, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record.map_err(|e| LoaderError::parse(source, e))?;
            table
                .push_row(record.iter().map(Value::infer).collect())
                .map_err(|e| LoaderError::parse(source, e))?;
        }

        Ok(table)
    }
}
