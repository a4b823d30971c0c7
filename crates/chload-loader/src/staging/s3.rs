//! S3 (or S3-compatible) staging
//!
//! Paths look like `s3://bucket/prefix`. Listing pages through
//! `ListObjectsV2`; recursive delete removes every object under the prefix.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    Client,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::StagingStore;
use crate::error::{LoaderError, Result};

pub(crate) const SCHEME: &str = "s3://";

/// S3 client settings; the bucket comes from each staging path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl S3Config {
    pub fn from_env() -> chload_common::Result<Self> {
        use chload_common::env;

        Ok(Self {
            endpoint: env::var_opt("S3_ENDPOINT"),
            region: env::var_or("S3_REGION", "us-east-1"),
            access_key: env::var_opt("S3_ACCESS_KEY").or_else(|| env::var_opt("AWS_ACCESS_KEY_ID")),
            secret_key: env::var_opt("S3_SECRET_KEY")
                .or_else(|| env::var_opt("AWS_SECRET_ACCESS_KEY")),
            path_style: env::parse_or("S3_PATH_STYLE", false)?,
        })
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }
}

/// Split `s3://bucket/prefix` into bucket and key prefix
pub fn split_s3_path(path: &str) -> Result<(&str, &str)> {
    let rest = path
        .strip_prefix(SCHEME)
        .ok_or_else(|| LoaderError::Staging(format!("not an s3:// path: {}", path)))?;

    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(LoaderError::Staging(format!("missing bucket in {}", path)));
    }

    Ok((bucket, key))
}

#[derive(Clone)]
pub struct S3Staging {
    client: Client,
}

impl S3Staging {
    pub async fn new(config: &S3Config) -> Self {
        debug!(endpoint = ?config.endpoint, region = %config.region, "Initializing S3 staging");

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(
                    access,
                    secret,
                    None,
                    None,
                    "chload-staging",
                )),
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    LoaderError::Staging(format!(
                        "failed to list s3://{}/{}: {}",
                        bucket, prefix, e
                    ))
                })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Keys that belong to the staging location at `prefix`
    ///
    /// `orders` means everything under `orders/`, or the single object
    /// `orders` when there is no such directory. Siblings such as
    /// `orders_archive/part-0.csv` never match.
    async fn staged_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        if prefix.is_empty() || prefix.ends_with('/') {
            return self.list_keys(bucket, prefix).await;
        }

        let keys = self.list_keys(bucket, &format!("{}/", prefix)).await?;
        if !keys.is_empty() {
            return Ok(keys);
        }

        Ok(self
            .list_keys(bucket, prefix)
            .await?
            .into_iter()
            .filter(|key| key == prefix)
            .collect())
    }
}

#[async_trait]
impl StagingStore for S3Staging {
    #[instrument(skip(self))]
    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let (bucket, prefix) = split_s3_path(path)?;
        let keys = self.staged_keys(bucket, prefix).await?;

        debug!(objects = keys.len(), "Listed S3 staging");
        Ok(keys
            .into_iter()
            .map(|key| format!("{}{}/{}", SCHEME, bucket, key))
            .collect())
    }

    #[instrument(skip(self))]
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let (bucket, key) = split_s3_path(path)?;

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| LoaderError::Staging(format!("failed to download {}: {}", path, e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| LoaderError::Staging(format!("failed to read body of {}: {}", path, e)))?
            .into_bytes()
            .to_vec();

        debug!(bytes = data.len(), "Downloaded staged object");
        Ok(data)
    }

    #[instrument(skip(self))]
    async fn delete_recursive(&self, path: &str) -> Result<()> {
        let (bucket, prefix) = split_s3_path(path)?;
        let keys = self.staged_keys(bucket, prefix).await?;

        for key in &keys {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    LoaderError::Staging(format!("failed to delete s3://{}/{}: {}", bucket, key, e))
                })?;
        }

        info!(objects = keys.len(), "Deleted S3 staging");
        Ok(())
    }
}
