//! Staged data parsers
//!
//! A parser turns the files under a batch's staging path into one [`Table`].
//! Parsers are looked up by the batch's file-type tag through
//! [`ParserRegistry`]; asking for a tag nobody registered is an error.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{LoaderError, Result};
use crate::model::BatchDescriptor;
use crate::staging::{is_data_file, StagingStore};
use crate::table::Table;

pub mod csv;
pub mod jsonl;

pub use self::csv::CsvParser;
pub use self::jsonl::JsonLinesParser;

/// Reads one staged file format
#[async_trait]
pub trait StagedParser: Send + Sync {
    /// File-type tag this parser answers to, e.g. `"csv"`
    fn file_type(&self) -> &str;

    /// Parse a single staged file
    fn parse_file(&self, source: &str, data: &[u8]) -> Result<Table>;

    /// Parse every data file under the batch's staging path
    ///
    /// Files are read in sorted order and concatenated; writer markers such
    /// as `_SUCCESS` are skipped.
    async fn parse(&self, batch: &BatchDescriptor, staging: &dyn StagingStore) -> Result<Table> {
        let path = batch.staging_path()?;
        let files: Vec<String> = staging
            .list(path)
            .await?
            .into_iter()
            .filter(|f| is_data_file(f))
            .collect();

        debug!(path, files = files.len(), file_type = self.file_type(), "Parsing staged files");

        let mut table: Option<Table> = None;
        for file in &files {
            let data = staging.read(file).await?;
            let part = self.parse_file(file, &data)?;
            table = Some(match table {
                Some(acc) => acc.concat(part),
                None => part,
            });
        }

        Ok(table.unwrap_or_default())
    }
}

/// File-type tag to parser lookup
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn StagedParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `csv` and `jsonl` parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CsvParser::default()));
        registry.register(Arc::new(JsonLinesParser));
        registry
    }

    /// Register a parser under its own tag, replacing any previous one
    pub fn register(&mut self, parser: Arc<dyn StagedParser>) {
        self.parsers.insert(parser.file_type().to_lowercase(), parser);
    }

    pub fn resolve(&self, file_type: &str) -> Result<Arc<dyn StagedParser>> {
        self.parsers
            .get(&file_type.to_lowercase())
            .cloned()
            .ok_or_else(|| LoaderError::UnknownFileType(file_type.to_string()))
    }

    pub fn file_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}
