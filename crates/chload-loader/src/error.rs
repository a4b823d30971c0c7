//! Loader error types
//!
//! [`LoaderError`] covers failures of the collaborators (manifest store,
//! parsers, sinks, staging). [`LoadError`] is what [`crate::Loader::load`]
//! hands back to its caller once the failure policy has been applied.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ManifestStatus;

/// Result type alias for collaborator operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Failure raised by a collaborator
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] chload_common::CommonError),

    #[error("No parser registered for file type {0:?}")]
    UnknownFileType(String),

    #[error("Failed to parse {source_path}: {message}")]
    Parse { source_path: String, message: String },

    #[error("Write to {table} failed: {message}")]
    Write { table: String, message: String },

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LoaderError {
    pub fn parse(source_path: impl Into<String>, message: impl ToString) -> Self {
        LoaderError::Parse {
            source_path: source_path.into(),
            message: message.to_string(),
        }
    }

    pub fn write(table: impl Into<String>, message: impl ToString) -> Self {
        LoaderError::Write {
            table: table.into(),
            message: message.to_string(),
        }
    }
}

/// Step of the guarded load sequence that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStep {
    MarkLoading,
    Validate,
    ResolveParser,
    Parse,
    Write,
    MarkCompleted,
}

impl LoadStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStep::MarkLoading => "mark_loading",
            LoadStep::Validate => "validate",
            LoadStep::ResolveParser => "resolve_parser",
            LoadStep::Parse => "parse",
            LoadStep::Write => "write",
            LoadStep::MarkCompleted => "mark_completed",
        }
    }
}

impl std::fmt::Display for LoadStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record of a failed load attempt
#[derive(Error, Debug, Clone)]
#[error("{stage} failed for table {table_name} at {step}: {error} (started {started_at})")]
pub struct LoadFailure {
    pub table_name: String,
    /// Pipeline stage the failure belongs to; always `"loading"` here
    pub stage: &'static str,
    pub step: LoadStep,
    pub error: String,
    pub started_at: DateTime<Utc>,
}

/// Error returned by [`crate::Loader::load`]
#[derive(Error, Debug)]
pub enum LoadError {
    /// The load failed and the batch does not allow passing on errors
    #[error(transparent)]
    Failed(LoadFailure),

    /// The manifest itself could not be written
    #[error("Could not record {status} state for table {table_name}: {source}")]
    ManifestWrite {
        table_name: String,
        status: ManifestStatus,
        #[source]
        source: LoaderError,
        /// The load failure that was being recorded, if any
        original: Option<LoadFailure>,
    },
}

impl LoadError {
    pub fn table_name(&self) -> &str {
        match self {
            LoadError::Failed(failure) => &failure.table_name,
            LoadError::ManifestWrite { table_name, .. } => table_name,
        }
    }
}
