//! ClickHouse HTTP sink tests against a mock server

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chload_loader::manifest::InMemoryManifestStore;
use chload_loader::sink::ClickHouseSink;
use chload_loader::{
    BatchDescriptor, ConnectionParams, Destination, LoadOutcome, LoadStep, Loader, LoaderError,
    ManifestStatus, ManifestStore, ParserRegistry, StagingRouter, Table, TabularWriteSink, Value,
    WriteMode,
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{basic_auth, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INSERT_ORDERS: &str =
    "INSERT INTO `analytics`.`orders` (`id`, `etl_time`) FORMAT JSONEachRow";

fn connection(server: &MockServer) -> ConnectionParams {
    let address = server.address();
    ConnectionParams {
        destination: Destination::ClickHouse,
        host: address.ip().to_string(),
        port: address.port(),
        user: "loader".to_string(),
        password: "s3cret".to_string(),
        database: "analytics".to_string(),
    }
}

fn sink(server: &MockServer) -> ClickHouseSink {
    ClickHouseSink::new(connection(server), Duration::from_secs(5)).unwrap()
}

fn stamped_orders(rows: i64) -> Table {
    let mut table = Table::new(vec!["id".into()]);
    for id in 1..=rows {
        table.push_row(vec![Value::Int(id)]).unwrap();
    }
    table.stamp_provenance("etl_time", Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap());
    table
}

#[tokio::test]
async fn test_insert_is_split_into_chunks() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(query_param("query", INSERT_ORDERS))
        .and(query_param("date_time_input_format", "best_effort"))
        .and(basic_auth("loader", "s3cret"))
        .and(body_string_contains("\"etl_time\":\"2026-10-19 06:00:00.000000\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let written = sink(&server)
        .write(&stamped_orders(3), "orders", WriteMode::Append, 2)
        .await
        .unwrap();

    assert_eq!(written, 3);
}

#[tokio::test]
async fn test_server_error_becomes_write_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_string("Code: 60. DB::Exception: Table analytics.orders does not exist."),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = sink(&server)
        .write(&stamped_orders(3), "orders", WriteMode::Append, 2)
        .await
        .unwrap_err();

    match err {
        LoaderError::Write { table, message } => {
            assert_eq!(table, "orders");
            assert!(message.starts_with("HTTP 404"));
            assert!(message.contains("Code: 60"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_insert_is_recorded_in_manifest() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Code: 210. Connection refused"))
        .mount(&server)
        .await;

    let staging = tempfile::tempdir().unwrap();
    let dir = staging.path().join("orders");
    std::fs::create_dir(&dir).unwrap();
    std::fs::write(dir.join("part-00000.csv"), "id\n1\n2\n").unwrap();

    let manifest = Arc::new(InMemoryManifestStore::new());
    let loader = Loader::new(
        manifest.clone(),
        Arc::new(ParserRegistry::with_defaults()),
        Arc::new(sink(&server)),
        Arc::new(StagingRouter::local_only()),
    );

    let batch =
        BatchDescriptor::staged("orders", "csv", dir.to_str().unwrap()).with_pass_on_error(true);
    let outcome = loader.load(&batch, Utc::now()).await.unwrap();

    match outcome {
        LoadOutcome::Handled { failure } => {
            assert_eq!(failure.step, LoadStep::Write);
            assert!(failure.error.contains("Code: 210"));
        },
        other => panic!("unexpected outcome: {other:?}"),
    }

    let row = manifest.get("orders").await.unwrap().unwrap();
    assert_eq!(row.status, ManifestStatus::Failed);
    assert!(row.error_message.contains("HTTP 500"));
    assert!(dir.exists());
}
