//! Loader orchestration tests against in-process collaborators
//!
//! Every fake writes into one shared event log so the tests can check the
//! order in which the manifest, parser and sink were touched.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chload_loader::destination::Destination;
use chload_loader::staging::LocalStaging;
use chload_loader::{
    BatchDescriptor, InMemoryManifestStore, LoadError, LoadOutcome, LoadStep, Loader, LoaderError,
    ManifestRecord, ManifestStatus, ManifestStore, ManifestUpdate, ParserRegistry,
    ReplicationMethod, Result, StagedParser, StagingStore, Table, TabularWriteSink, Value,
    WriteMode,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};

type Events = Arc<Mutex<Vec<String>>>;

fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

fn snapshot(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}

fn started_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap()
}

// ============================================================================
// Fakes
// ============================================================================

/// In-memory manifest that logs every status it is asked to write
struct RecordingManifest {
    inner: InMemoryManifestStore,
    events: Events,
    fail_on: Option<ManifestStatus>,
}

impl RecordingManifest {
    fn new(events: Events) -> Self {
        Self {
            inner: InMemoryManifestStore::new(),
            events,
            fail_on: None,
        }
    }

    fn failing_on(events: Events, status: ManifestStatus) -> Self {
        Self {
            fail_on: Some(status),
            ..Self::new(events)
        }
    }
}

#[async_trait]
impl ManifestStore for RecordingManifest {
    async fn update(&self, update: &ManifestUpdate) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("manifest:{}", update.status));
        if self.fail_on == Some(update.status) {
            return Err(LoaderError::Config("manifest database unavailable".to_string()));
        }
        self.inner.update(update).await
    }

    async fn get(&self, table_name: &str) -> Result<Option<ManifestRecord>> {
        self.inner.get(table_name).await
    }

    fn backend(&self) -> &'static str {
        "recording"
    }
}

/// Parser for a format the loader has no built-in reader for
struct FakeParquetParser {
    events: Events,
}

#[async_trait]
impl StagedParser for FakeParquetParser {
    fn file_type(&self) -> &str {
        "parquet"
    }

    fn parse_file(&self, _source: &str, _data: &[u8]) -> Result<Table> {
        unreachable!("parse is overridden")
    }

    async fn parse(&self, _batch: &BatchDescriptor, _staging: &dyn StagingStore) -> Result<Table> {
        self.events.lock().unwrap().push("parse".to_string());
        let mut table = Table::new(vec!["id".into(), "etl_time".into()]);
        table
            .push_row(vec![Value::Int(41), Value::String("stale".into())])
            .unwrap();
        table
            .push_row(vec![Value::Int(42), Value::String("stale".into())])
            .unwrap();
        Ok(table)
    }
}

struct FakeSink {
    events: Events,
    fail_with: Option<String>,
    written: Mutex<Vec<(String, Table, u32)>>,
}

impl FakeSink {
    fn ok(events: Events) -> Self {
        Self {
            events,
            fail_with: None,
            written: Mutex::new(Vec::new()),
        }
    }

    fn failing(events: Events, message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::ok(events)
        }
    }
}

#[async_trait]
impl TabularWriteSink for FakeSink {
    fn destination(&self) -> Destination {
        Destination::ClickHouse
    }

    async fn write(
        &self,
        table: &Table,
        target: &str,
        mode: WriteMode,
        batch_size: u32,
    ) -> Result<u64> {
        assert_eq!(mode, WriteMode::Append);
        self.events.lock().unwrap().push("write".to_string());
        if let Some(message) = &self.fail_with {
            return Err(LoaderError::write(target, message));
        }
        self.written
            .lock()
            .unwrap()
            .push((target.to_string(), table.clone(), batch_size));
        Ok(table.num_rows() as u64)
    }
}

/// Local staging whose deletes always fail
struct UndeletableStaging;

#[async_trait]
impl StagingStore for UndeletableStaging {
    async fn list(&self, path: &str) -> Result<Vec<String>> {
        LocalStaging.list(path).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        LocalStaging.read(path).await
    }

    async fn delete_recursive(&self, path: &str) -> Result<()> {
        Err(LoaderError::Staging(format!("permission denied: {}", path)))
    }
}

struct Harness {
    events: Events,
    manifest: Arc<RecordingManifest>,
    sink: Arc<FakeSink>,
    loader: Loader,
}

fn harness_with(
    events: Events,
    manifest: RecordingManifest,
    sink: FakeSink,
    staging: Arc<dyn StagingStore>,
) -> Harness {
    let manifest = Arc::new(manifest);
    let sink = Arc::new(sink);

    let mut parsers = ParserRegistry::with_defaults();
    parsers.register(Arc::new(FakeParquetParser {
        events: events.clone(),
    }));

    let loader = Loader::new(manifest.clone(), Arc::new(parsers), sink.clone(), staging);

    Harness {
        events,
        manifest,
        sink,
        loader,
    }
}

fn harness(sink_error: Option<&str>) -> Harness {
    let events = events();
    let sink = match sink_error {
        Some(message) => FakeSink::failing(events.clone(), message),
        None => FakeSink::ok(events.clone()),
    };
    harness_with(
        events.clone(),
        RecordingManifest::new(events),
        sink,
        Arc::new(LocalStaging),
    )
}

fn previous_run() -> ManifestRecord {
    ManifestRecord {
        table_name: "orders".to_string(),
        last_point_value: Some(json!(17)),
        iterate_column_type: Some("int".to_string()),
        status: ManifestStatus::Completed,
        replication_method: ReplicationMethod::Incremental,
        error_message: String::new(),
        updated_at: Utc::now(),
    }
}

fn parquet_batch(path: &str) -> BatchDescriptor {
    BatchDescriptor::staged("orders", "parquet", path)
        .with_cursor(json!(42), "int")
        .with_replication_method(ReplicationMethod::Incremental)
}

// ============================================================================
// No new data
// ============================================================================

#[tokio::test]
async fn test_no_new_data_marks_completed_without_touching_cursor() {
    let h = harness(None);
    h.manifest.inner.insert(previous_run()).await;

    let mut batch = BatchDescriptor::no_new_data("orders");
    batch.last_point_value = Some(json!(99));

    let outcome = h.loader.load(&batch, started_at()).await.unwrap();

    assert!(matches!(outcome, LoadOutcome::NoNewData));
    assert_eq!(snapshot(&h.events), vec!["manifest:completed"]);
    assert!(h.sink.written.lock().unwrap().is_empty());

    let row = h.manifest.get("orders").await.unwrap().unwrap();
    assert_eq!(row.status, ManifestStatus::Completed);
    assert_eq!(row.last_point_value, Some(json!(17)));
    assert_eq!(row.iterate_column_type.as_deref(), Some("int"));
    assert!(row.error_message.is_empty());
}

#[tokio::test]
async fn test_no_new_data_on_first_run_creates_completed_row() {
    let h = harness(None);

    h.loader
        .load(&BatchDescriptor::no_new_data("orders"), started_at())
        .await
        .unwrap();

    let row = h.manifest.get("orders").await.unwrap().unwrap();
    assert_eq!(row.status, ManifestStatus::Completed);
    assert!(row.last_point_value.is_none());
}

#[tokio::test]
async fn test_no_new_data_manifest_failure_is_fatal() {
    let events = events();
    let h = harness_with(
        events.clone(),
        RecordingManifest::failing_on(events.clone(), ManifestStatus::Completed),
        FakeSink::ok(events),
        Arc::new(LocalStaging),
    );

    let batch = BatchDescriptor::no_new_data("orders").with_pass_on_error(true);
    let err = h.loader.load(&batch, started_at()).await.unwrap_err();

    match err {
        LoadError::ManifestWrite {
            status, original, ..
        } => {
            assert_eq!(status, ManifestStatus::Completed);
            assert!(original.is_none());
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// Successful loads
// ============================================================================

#[tokio::test]
async fn test_successful_load_advances_cursor() {
    let staging = tempfile::tempdir().unwrap();
    let path = staging.path().join("orders");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("part-00000.parquet"), b"PAR1").unwrap();

    let h = harness(None);
    h.manifest.inner.insert(previous_run()).await;

    let batch = parquet_batch(path.to_str().unwrap()).with_batch_size(500);
    let outcome = h.loader.load(&batch, started_at()).await.unwrap();

    match outcome {
        LoadOutcome::Loaded { rows, .. } => assert_eq!(rows, 2),
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(
        snapshot(&h.events),
        vec!["manifest:loading", "parse", "write", "manifest:completed"]
    );

    let row = h.manifest.get("orders").await.unwrap().unwrap();
    assert_eq!(row.status, ManifestStatus::Completed);
    assert_eq!(row.last_point_value, Some(json!(42)));
    assert_eq!(row.iterate_column_type.as_deref(), Some("int"));
    assert_eq!(row.replication_method, ReplicationMethod::Incremental);
    assert_eq!(row.error_message, "");

    assert!(!path.exists(), "staging should be removed after a successful load");
}

#[tokio::test]
async fn test_written_table_carries_one_provenance_column() {
    let h = harness(None);
    let batch = parquet_batch("/nonexistent/orders");

    h.loader.load(&batch, started_at()).await.unwrap();

    let written = h.sink.written.lock().unwrap();
    let (target, table, batch_size) = &written[0];
    assert_eq!(target, "orders");
    assert_eq!(*batch_size, 100_000);

    let stamped: Vec<_> = table.columns().iter().filter(|c| *c == "etl_time").collect();
    assert_eq!(stamped.len(), 1);

    let idx = table.column_index("etl_time").unwrap();
    for row in table.rows() {
        assert_eq!(row[idx], Value::Timestamp(started_at()));
    }
}

#[tokio::test]
async fn test_csv_batch_end_to_end_from_local_staging() {
    let staging = tempfile::tempdir().unwrap();
    let path = staging.path().join("customers");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("part-00000.csv"), "id,name\n1,ada\n2,grace\n").unwrap();
    std::fs::write(path.join("part-00001.csv"), "id,name\n3,edsger\n").unwrap();
    std::fs::write(path.join("_SUCCESS"), "").unwrap();

    let h = harness(None);
    let batch =
        BatchDescriptor::staged("customers", "csv", path.to_str().unwrap()).with_batch_size(2);

    let outcome = h.loader.load(&batch, started_at()).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Loaded { rows: 3, .. }));

    let written = h.sink.written.lock().unwrap();
    let (_, table, batch_size) = &written[0];
    assert_eq!(*batch_size, 2);
    assert_eq!(table.columns(), ["id", "name", "etl_time"]);
    assert_eq!(table.rows()[2][1], Value::String("edsger".into()));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_cleanup_failure_does_not_fail_the_load() {
    let events = events();
    let h = harness_with(
        events.clone(),
        RecordingManifest::new(events.clone()),
        FakeSink::ok(events),
        Arc::new(UndeletableStaging),
    );

    let outcome = h
        .loader
        .load(&parquet_batch("/stage/orders"), started_at())
        .await
        .unwrap();

    assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
    let row = h.manifest.get("orders").await.unwrap().unwrap();
    assert_eq!(row.status, ManifestStatus::Completed);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_sink_failure_without_pass_on_error_is_fatal() {
    let staging = tempfile::tempdir().unwrap();
    let path = staging.path().join("orders");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("part-00000.parquet"), b"PAR1").unwrap();

    let h = harness(Some("Connection refused (os error 111)"));
    h.manifest.inner.insert(previous_run()).await;

    let err = h
        .loader
        .load(&parquet_batch(path.to_str().unwrap()), started_at())
        .await
        .unwrap_err();

    match &err {
        LoadError::Failed(failure) => {
            assert_eq!(failure.table_name, "orders");
            assert_eq!(failure.stage, "loading");
            assert_eq!(failure.step, LoadStep::Write);
            assert_eq!(failure.started_at, started_at());
            assert!(failure.error.contains("Connection refused"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.table_name(), "orders");

    assert_eq!(
        snapshot(&h.events),
        vec!["manifest:loading", "parse", "write", "manifest:failed"]
    );

    let row = h.manifest.get("orders").await.unwrap().unwrap();
    assert_eq!(row.status, ManifestStatus::Failed);
    assert_eq!(row.last_point_value, Some(json!(17)));
    assert!(row.error_message.contains("Connection refused"));

    assert!(path.exists(), "failed loads keep their staging");
}

#[tokio::test]
async fn test_sink_failure_with_pass_on_error_is_handled() {
    let h = harness(Some("Connection refused (os error 111)"));
    h.manifest.inner.insert(previous_run()).await;

    let batch = parquet_batch("/stage/orders").with_pass_on_error(true);
    let outcome = h.loader.load(&batch, started_at()).await.unwrap();

    assert!(outcome.is_handled_failure());
    match outcome {
        LoadOutcome::Handled { failure } => {
            assert_eq!(failure.step, LoadStep::Write);
            assert!(failure.error.contains("Connection refused"));
        },
        other => panic!("unexpected outcome: {other:?}"),
    }

    let row = h.manifest.get("orders").await.unwrap().unwrap();
    assert_eq!(row.status, ManifestStatus::Failed);
    assert_eq!(row.last_point_value, Some(json!(17)));
    assert!(row.error_message.contains("Connection refused"));
}

#[tokio::test]
async fn test_parse_failure_never_reaches_sink() {
    let staging = tempfile::tempdir().unwrap();
    let path = staging.path().join("orders");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("part-00000.jsonl"), "{\"id\": 1}\nnot json\n").unwrap();

    let h = harness(None);
    let batch = BatchDescriptor::staged("orders", "jsonl", path.to_str().unwrap());

    let err = h.loader.load(&batch, started_at()).await.unwrap_err();
    match err {
        LoadError::Failed(failure) => assert_eq!(failure.step, LoadStep::Parse),
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(snapshot(&h.events), vec!["manifest:loading", "manifest:failed"]);
    assert!(h.sink.written.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unregistered_file_type_is_recorded_as_failed() {
    let h = harness(None);
    let batch = BatchDescriptor::staged("orders", "orc", "/stage/orders");

    let err = h.loader.load(&batch, started_at()).await.unwrap_err();
    match err {
        LoadError::Failed(failure) => {
            assert_eq!(failure.step, LoadStep::ResolveParser);
            assert!(failure.error.contains("orc"));
        },
        other => panic!("unexpected error: {other:?}"),
    }

    let row = h.manifest.get("orders").await.unwrap().unwrap();
    assert_eq!(row.status, ManifestStatus::Failed);
}

#[tokio::test]
async fn test_mark_loading_failure_goes_through_failure_handler() {
    let events = events();
    let h = harness_with(
        events.clone(),
        RecordingManifest::failing_on(events.clone(), ManifestStatus::Loading),
        FakeSink::ok(events),
        Arc::new(LocalStaging),
    );

    let batch = parquet_batch("/stage/orders").with_pass_on_error(true);
    let outcome = h.loader.load(&batch, started_at()).await.unwrap();

    match outcome {
        LoadOutcome::Handled { failure } => assert_eq!(failure.step, LoadStep::MarkLoading),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(snapshot(&h.events), vec!["manifest:loading", "manifest:failed"]);

    let row = h.manifest.get("orders").await.unwrap().unwrap();
    assert_eq!(row.status, ManifestStatus::Failed);
}

#[tokio::test]
async fn test_failed_status_write_failure_is_fatal_even_with_pass_on_error() {
    let events = events();
    let h = harness_with(
        events.clone(),
        RecordingManifest::failing_on(events.clone(), ManifestStatus::Failed),
        FakeSink::failing(events, "Connection refused"),
        Arc::new(LocalStaging),
    );

    let batch = parquet_batch("/stage/orders").with_pass_on_error(true);
    let err = h.loader.load(&batch, started_at()).await.unwrap_err();

    match err {
        LoadError::ManifestWrite {
            table_name,
            status,
            original,
            ..
        } => {
            assert_eq!(table_name, "orders");
            assert_eq!(status, ManifestStatus::Failed);
            let original = original.unwrap();
            assert_eq!(original.step, LoadStep::Write);
            assert!(original.error.contains("Connection refused"));
        },
        other => panic!("unexpected error: {other:?}"),
    }

    // The row is left in `loading`, the stuck signal for external recovery
    let row = h.manifest.get("orders").await.unwrap().unwrap();
    assert_eq!(row.status, ManifestStatus::Loading);
}
