//! S3 staging tests against a mock S3 endpoint (path-style addressing)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chload_loader::staging::{S3Config, S3Staging};
use chload_loader::StagingStore;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUCKET_PATH: &str = r"^/stage/?$";

async fn staging(server: &MockServer) -> S3Staging {
    S3Staging::new(&S3Config {
        endpoint: Some(server.uri()),
        region: "us-east-1".to_string(),
        access_key: Some("test".to_string()),
        secret_key: Some("test".to_string()),
        path_style: true,
    })
    .await
}

/// `ListObjectsV2` response body
fn listing(prefix: &str, keys: &[&str], next_token: Option<&str>) -> ResponseTemplate {
    let contents: String = keys
        .iter()
        .map(|key| format!("<Contents><Key>{}</Key><Size>8</Size></Contents>", key))
        .collect();
    let (truncated, token) = match next_token {
        Some(token) => (
            "true",
            format!("<NextContinuationToken>{}</NextContinuationToken>", token),
        ),
        None => ("false", String::new()),
    };

    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
<Name>stage</Name><Prefix>{prefix}</Prefix><KeyCount>{count}</KeyCount>
<MaxKeys>1000</MaxKeys><IsTruncated>{truncated}</IsTruncated>{token}{contents}
</ListBucketResult>"#,
        count = keys.len(),
    );

    ResponseTemplate::new(200).set_body_raw(body, "application/xml")
}

async fn mount_listing(server: &MockServer, prefix: &str, keys: &[&str], expected: u64) {
    Mock::given(method("GET"))
        .and(path_regex(BUCKET_PATH))
        .and(query_param("list-type", "2"))
        .and(query_param("prefix", prefix))
        .respond_with(listing(prefix, keys, None))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_delete(server: &MockServer, key: &str, expected: u64) {
    Mock::given(method("DELETE"))
        .and(path(format!("/stage/{}", key)))
        .respond_with(ResponseTemplate::new(204))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_directory_staging_ignores_sibling_prefixes() {
    let server = MockServer::start().await;

    mount_listing(&server, "orders/", &["orders/part-0.csv", "orders/part-1.csv"], 2).await;
    // A bare-prefix listing would also return another table's staging
    mount_listing(
        &server,
        "orders",
        &["orders/part-0.csv", "orders_archive/part-0.csv"],
        0,
    )
    .await;
    mount_delete(&server, "orders/part-0.csv", 1).await;
    mount_delete(&server, "orders/part-1.csv", 1).await;
    mount_delete(&server, "orders_archive/part-0.csv", 0).await;

    let staging = staging(&server).await;

    let files = staging.list("s3://stage/orders").await.unwrap();
    assert_eq!(
        files,
        vec!["s3://stage/orders/part-0.csv", "s3://stage/orders/part-1.csv"]
    );

    staging.delete_recursive("s3://stage/orders").await.unwrap();
}

#[tokio::test]
async fn test_truncated_listing_follows_continuation_token() {
    let server = MockServer::start().await;

    // Registered first so it wins over the first-page mock for page two
    Mock::given(method("GET"))
        .and(path_regex(BUCKET_PATH))
        .and(query_param("prefix", "orders/"))
        .and(query_param("continuation-token", "page-2"))
        .respond_with(listing("orders/", &["orders/part-2.csv"], None))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(BUCKET_PATH))
        .and(query_param("prefix", "orders/"))
        .respond_with(listing(
            "orders/",
            &["orders/part-1.csv", "orders/part-0.csv"],
            Some("page-2"),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let files = staging(&server).await.list("s3://stage/orders").await.unwrap();

    assert_eq!(
        files,
        vec![
            "s3://stage/orders/part-0.csv",
            "s3://stage/orders/part-1.csv",
            "s3://stage/orders/part-2.csv",
        ]
    );
}

#[tokio::test]
async fn test_single_object_staging_and_read() {
    let server = MockServer::start().await;

    mount_listing(&server, "orders.csv/", &[], 1).await;
    mount_listing(&server, "orders.csv", &["orders.csv", "orders.csv.bak"], 1).await;

    Mock::given(method("GET"))
        .and(path("/stage/orders.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"id\n1\n2\n".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let staging = staging(&server).await;

    let files = staging.list("s3://stage/orders.csv").await.unwrap();
    assert_eq!(files, vec!["s3://stage/orders.csv"]);

    let data = staging.read(&files[0]).await.unwrap();
    assert_eq!(data, b"id\n1\n2\n");
}
