//! Load orchestration
//!
//! [`Loader::load`] drives one batch through the manifest state machine:
//!
//! ```text
//! no file type ─────────────────────────────▶ completed (cursor kept)
//! file type ─▶ loading ─▶ parse ─▶ stamp ─▶ write ─▶ completed (cursor advanced)
//!                 │                                   │
//!                 └──────── any error ────────────────┴─▶ failed (cursor kept)
//! ```
//!
//! Staged files are removed only after the `completed` row is recorded.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{LoadError, LoadFailure, LoadStep, LoaderError, Result};
use crate::manifest::{build_manifest_store, ManifestStore};
use crate::model::{BatchDescriptor, ManifestStatus, ManifestUpdate};
use crate::parser::ParserRegistry;
use crate::sink::{build_sink, TabularWriteSink, WriteMode};
use crate::staging::{LocalStaging, S3Staging, StagingRouter, StagingStore};
use crate::table::DEFAULT_PROVENANCE_COLUMN;

/// Stage name carried by every failure record
pub const LOADING_STAGE: &str = "loading";

/// Loader knobs that are not per-batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSettings {
    /// Column that receives the load-start timestamp
    pub provenance_column: String,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            provenance_column: DEFAULT_PROVENANCE_COLUMN.to_string(),
        }
    }
}

/// How a call to [`Loader::load`] ended, short of a fatal error
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The extractor found nothing new; the manifest was marked completed
    NoNewData,
    /// Rows were written and the cursor advanced
    Loaded { rows: u64, elapsed: Duration },
    /// The load failed, was recorded, and the batch allows the run to continue
    Handled { failure: LoadFailure },
}

impl LoadOutcome {
    pub fn is_handled_failure(&self) -> bool {
        matches!(self, LoadOutcome::Handled { .. })
    }
}

/// Error from one guarded step, tagged with where it happened
struct StepError {
    step: LoadStep,
    source: LoaderError,
}

trait AtStep<T> {
    fn at(self, step: LoadStep) -> std::result::Result<T, StepError>;
}

impl<T> AtStep<T> for Result<T> {
    fn at(self, step: LoadStep) -> std::result::Result<T, StepError> {
        self.map_err(|source| StepError { step, source })
    }
}

/// Destination-side load orchestrator
///
/// Collaborators are built once per process and shared; the loader itself
/// holds no per-batch state, so one instance serves every batch of a run.
pub struct Loader {
    manifest: Arc<dyn ManifestStore>,
    parsers: Arc<ParserRegistry>,
    sink: Arc<dyn TabularWriteSink>,
    staging: Arc<dyn StagingStore>,
    settings: LoaderSettings,
}

impl Loader {
    pub fn new(
        manifest: Arc<dyn ManifestStore>,
        parsers: Arc<ParserRegistry>,
        sink: Arc<dyn TabularWriteSink>,
        staging: Arc<dyn StagingStore>,
    ) -> Self {
        Self {
            manifest,
            parsers,
            sink,
            staging,
            settings: LoaderSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LoaderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Wire up the configured manifest backend, sink and staging stores
    pub async fn from_config(config: &Config) -> Result<Self> {
        let manifest = build_manifest_store(&config.manifest).await?;
        let sink = build_sink(&config.destination).await?;
        let s3 = S3Staging::new(&config.s3).await;
        let staging = StagingRouter::new(LocalStaging, Some(Arc::new(s3)));

        info!(
            destination = %sink.destination(),
            url = %config.destination.connection.redacted_jdbc_url(),
            manifest = manifest.backend(),
            "Loader ready"
        );

        Ok(Self::new(
            manifest,
            Arc::new(ParserRegistry::with_defaults()),
            sink,
            Arc::new(staging),
        )
        .with_settings(config.loader.clone()))
    }

    pub fn manifest(&self) -> &Arc<dyn ManifestStore> {
        &self.manifest
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Load one batch that the extraction stage started at `started_at`
    ///
    /// Returns `Err` only when the failure is fatal for the run: the batch
    /// does not pass on errors, or the manifest could not record the outcome.
    pub async fn load(
        &self,
        batch: &BatchDescriptor,
        started_at: DateTime<Utc>,
    ) -> std::result::Result<LoadOutcome, LoadError> {
        let span = info_span!(
            "load",
            table = %batch.table_name,
            load_id = %Uuid::new_v4(),
        );
        self.load_batch(batch, started_at).instrument(span).await
    }

    async fn load_batch(
        &self,
        batch: &BatchDescriptor,
        started_at: DateTime<Utc>,
    ) -> std::result::Result<LoadOutcome, LoadError> {
        let clock = Instant::now();

        // No manifest row may be keyed by a blank name, so this is checked
        // before anything is written.
        if batch.table_name.trim().is_empty() {
            let failure = LoadFailure {
                table_name: batch.table_name.clone(),
                stage: LOADING_STAGE,
                step: LoadStep::Validate,
                error: LoaderError::InvalidBatch("table name is empty".to_string()).to_string(),
                started_at,
            };
            error!(step = %failure.step, error = %failure.error, "Rejected batch");
            return Err(LoadError::Failed(failure));
        }

        let Some(file_type) = batch.file_type.as_deref() else {
            return self.record_no_new_data(batch).await;
        };

        info!(
            file_type,
            replication_method = %batch.replication_method,
            batchsize = batch.batchsize,
            started_at = %started_at,
            "Loading table"
        );

        match self.run(batch, file_type, started_at).await {
            Ok(rows) => {
                self.reclaim_staging(batch).await;

                let elapsed = clock.elapsed();
                info!(
                    rows,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Load completed"
                );
                Ok(LoadOutcome::Loaded { rows, elapsed })
            },
            Err(err) => self.handle_failure(batch, started_at, err).await,
        }
    }

    async fn record_no_new_data(
        &self,
        batch: &BatchDescriptor,
    ) -> std::result::Result<LoadOutcome, LoadError> {
        let update = ManifestUpdate::status(batch, ManifestStatus::Completed);

        match self.manifest.update(&update).await {
            Ok(()) => {
                info!("No new data; manifest marked completed");
                Ok(LoadOutcome::NoNewData)
            },
            Err(source) => {
                error!(error = %source, "Could not record completed status for empty batch");
                Err(LoadError::ManifestWrite {
                    table_name: batch.table_name.clone(),
                    status: ManifestStatus::Completed,
                    source,
                    original: None,
                })
            },
        }
    }

    /// The guarded part of a load; every error comes back tagged with its step
    async fn run(
        &self,
        batch: &BatchDescriptor,
        file_type: &str,
        started_at: DateTime<Utc>,
    ) -> std::result::Result<u64, StepError> {
        self.manifest
            .update(&ManifestUpdate::status(batch, ManifestStatus::Loading))
            .await
            .at(LoadStep::MarkLoading)?;

        batch.validate().at(LoadStep::Validate)?;

        let parser = self.parsers.resolve(file_type).at(LoadStep::ResolveParser)?;
        let mut table = parser
            .parse(batch, self.staging.as_ref())
            .await
            .at(LoadStep::Parse)?;

        table.stamp_provenance(&self.settings.provenance_column, started_at);
        debug!(
            rows = table.num_rows(),
            columns = table.columns().len(),
            "Staged data parsed and stamped"
        );

        let rows = self
            .sink
            .write(&table, &batch.table_name, WriteMode::Append, batch.batchsize)
            .await
            .at(LoadStep::Write)?;

        self.manifest
            .update(&ManifestUpdate::completed(batch))
            .await
            .at(LoadStep::MarkCompleted)?;

        Ok(rows)
    }

    async fn reclaim_staging(&self, batch: &BatchDescriptor) {
        let Some(path) = batch.path.as_deref() else {
            return;
        };

        match self.staging.delete_recursive(path).await {
            Ok(()) => debug!(path, "Staging removed"),
            Err(e) => warn!(path, error = %e, "Could not remove staging; leaving it in place"),
        }
    }

    async fn handle_failure(
        &self,
        batch: &BatchDescriptor,
        started_at: DateTime<Utc>,
        err: StepError,
    ) -> std::result::Result<LoadOutcome, LoadError> {
        let failure = LoadFailure {
            table_name: batch.table_name.clone(),
            stage: LOADING_STAGE,
            step: err.step,
            error: err.source.to_string(),
            started_at,
        };

        error!(
            stage = failure.stage,
            step = %failure.step,
            error = %failure.error,
            started_at = %failure.started_at,
            "Load failed"
        );

        let update = ManifestUpdate::failed(batch, failure.error.clone());
        if let Err(source) = self.manifest.update(&update).await {
            error!(error = %source, "Could not record failed status");
            return Err(LoadError::ManifestWrite {
                table_name: batch.table_name.clone(),
                status: ManifestStatus::Failed,
                source,
                original: Some(failure),
            });
        }

        if batch.pass_on_error {
            warn!(step = %failure.step, "pass_on_error is set; continuing with the next table");
            Ok(LoadOutcome::Handled { failure })
        } else {
            Err(LoadError::Failed(failure))
        }
    }
}
