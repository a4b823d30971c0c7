//! Batch descriptors and manifest records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};

/// Default number of rows per write request
pub const DEFAULT_BATCH_SIZE: u32 = 100_000;

/// Incremental cursor value as produced by the extraction stage
///
/// Opaque to the loader: an id, a timestamp string, anything JSON can carry.
pub type CursorValue = serde_json::Value;

/// How a table is replicated from its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMethod {
    #[default]
    Full,
    Incremental,
}

impl ReplicationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationMethod::Full => "full",
            ReplicationMethod::Incremental => "incremental",
        }
    }
}

impl std::str::FromStr for ReplicationMethod {
    type Err = LoaderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full" => Ok(ReplicationMethod::Full),
            "incremental" => Ok(ReplicationMethod::Incremental),
            other => Err(LoaderError::Schema(format!(
                "Unknown replication method: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ReplicationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the most recent pipeline attempt for a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestStatus {
    Extracting,
    Loading,
    Completed,
    Failed,
}

impl ManifestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestStatus::Extracting => "extracting",
            ManifestStatus::Loading => "loading",
            ManifestStatus::Completed => "completed",
            ManifestStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ManifestStatus {
    type Err = LoaderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "extracting" => Ok(ManifestStatus::Extracting),
            "loading" => Ok(ManifestStatus::Loading),
            "completed" => Ok(ManifestStatus::Completed),
            "failed" => Ok(ManifestStatus::Failed),
            other => Err(LoaderError::Schema(format!("Unknown manifest status: {}", other))),
        }
    }
}

impl std::fmt::Display for ManifestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

/// One unit of load work handed over by the extraction stage
///
/// Field names follow the extraction stage's JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    pub table_name: String,
    /// Staged file format; `None` means the extractor found no new data
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub last_point_value: Option<CursorValue>,
    #[serde(default)]
    pub iterate_column_type: Option<String>,
    #[serde(default)]
    pub replication_method: ReplicationMethod,
    #[serde(default = "default_batch_size")]
    pub batchsize: u32,
    #[serde(default)]
    pub pass_on_error: bool,
    /// Staging location, a local path or `s3://bucket/prefix`
    #[serde(default)]
    pub path: Option<String>,
}

impl BatchDescriptor {
    /// Descriptor for a batch with no new data
    pub fn no_new_data(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            file_type: None,
            last_point_value: None,
            iterate_column_type: None,
            replication_method: ReplicationMethod::Full,
            batchsize: DEFAULT_BATCH_SIZE,
            pass_on_error: false,
            path: None,
        }
    }

    /// Descriptor for staged data of `file_type` under `path`
    pub fn staged(
        table_name: impl Into<String>,
        file_type: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            file_type: Some(file_type.into()),
            path: Some(path.into()),
            ..Self::no_new_data(table_name)
        }
    }

    pub fn with_cursor(mut self, value: CursorValue, value_type: impl Into<String>) -> Self {
        self.last_point_value = Some(value);
        self.iterate_column_type = Some(value_type.into());
        self
    }

    pub fn with_replication_method(mut self, method: ReplicationMethod) -> Self {
        self.replication_method = method;
        self
    }

    pub fn with_batch_size(mut self, batchsize: u32) -> Self {
        self.batchsize = batchsize;
        self
    }

    pub fn with_pass_on_error(mut self, pass_on_error: bool) -> Self {
        self.pass_on_error = pass_on_error;
        self
    }

    pub fn has_new_data(&self) -> bool {
        self.file_type.is_some()
    }

    /// Staging path, required whenever the batch carries data
    pub fn staging_path(&self) -> Result<&str> {
        match self.path.as_deref() {
            Some(path) if !path.trim().is_empty() => Ok(path),
            _ => Err(LoaderError::InvalidBatch(format!(
                "table {} has file type {:?} but no staging path",
                self.table_name, self.file_type
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(LoaderError::InvalidBatch("table name is empty".to_string()));
        }

        if self.batchsize == 0 {
            return Err(LoaderError::InvalidBatch(format!(
                "table {} has a batch size of 0",
                self.table_name
            )));
        }

        if self.has_new_data() {
            self.staging_path()?;
        }

        Ok(())
    }
}

/// Manifest row for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub table_name: String,
    pub last_point_value: Option<CursorValue>,
    pub iterate_column_type: Option<String>,
    pub status: ManifestStatus,
    pub replication_method: ReplicationMethod,
    /// Empty when the last attempt did not fail
    pub error_message: String,
    pub updated_at: DateTime<Utc>,
}

impl ManifestRecord {
    /// Fold an update into the current row, if any
    ///
    /// Absent cursor fields in the update keep whatever the row holds.
    pub fn apply(
        current: Option<&ManifestRecord>,
        update: &ManifestUpdate,
        now: DateTime<Utc>,
    ) -> Self {
        let keep_value = current.and_then(|r| r.last_point_value.clone());
        let keep_type = current.and_then(|r| r.iterate_column_type.clone());

        Self {
            table_name: update.table_name.clone(),
            last_point_value: update.last_point_value.clone().or(keep_value),
            iterate_column_type: update.iterate_column_type.clone().or(keep_type),
            status: update.status,
            replication_method: update.replication_method,
            error_message: update.error_message.clone(),
            updated_at: now,
        }
    }
}

/// Upsert request for a manifest row
///
/// `None` cursor fields mean "leave unchanged", never "clear".
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestUpdate {
    pub table_name: String,
    pub last_point_value: Option<CursorValue>,
    pub iterate_column_type: Option<String>,
    pub status: ManifestStatus,
    pub replication_method: ReplicationMethod,
    pub error_message: String,
}

impl ManifestUpdate {
    /// Status change that leaves the cursor alone and clears the error
    pub fn status(batch: &BatchDescriptor, status: ManifestStatus) -> Self {
        Self {
            table_name: batch.table_name.clone(),
            last_point_value: None,
            iterate_column_type: None,
            status,
            replication_method: batch.replication_method,
            error_message: String::new(),
        }
    }

    /// Successful load: advance the cursor to the batch's values
    pub fn completed(batch: &BatchDescriptor) -> Self {
        Self {
            last_point_value: batch.last_point_value.clone(),
            iterate_column_type: batch.iterate_column_type.clone(),
            ..Self::status(batch, ManifestStatus::Completed)
        }
    }

    /// Failed load: keep the cursor, record the error text
    pub fn failed(batch: &BatchDescriptor, error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            ..Self::status(batch, ManifestStatus::Failed)
        }
    }
}
