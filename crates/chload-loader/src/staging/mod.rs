//! Staging storage access
//!
//! The extraction stage leaves staged files under a path that is either a
//! local directory (or single file) or an `s3://bucket/prefix` location.
//! Parsers read through [`StagingStore`], and the loader reclaims the path
//! once the data is safely in the destination.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{LoaderError, Result};

pub mod local;
pub mod s3;

pub use local::LocalStaging;
pub use s3::{S3Config, S3Staging};

/// Read/delete access to staged intermediate files
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Every file under `path`, sorted; a file path lists itself
    async fn list(&self, path: &str) -> Result<Vec<String>>;

    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Remove `path` and everything under it; a missing path is not an error
    async fn delete_recursive(&self, path: &str) -> Result<()>;
}

/// Whether a listed file holds data rather than a writer marker
///
/// Skips `_SUCCESS`, `_committed_*`, `.part-0.crc` and the like.
pub fn is_data_file(path: &str) -> bool {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    !name.is_empty() && !name.starts_with('_') && !name.starts_with('.')
}

/// Routes `s3://` paths to S3 and everything else to the local filesystem
pub struct StagingRouter {
    local: LocalStaging,
    s3: Option<Arc<S3Staging>>,
}

impl StagingRouter {
    pub fn new(local: LocalStaging, s3: Option<Arc<S3Staging>>) -> Self {
        Self { local, s3 }
    }

    pub fn local_only() -> Self {
        Self::new(LocalStaging, None)
    }

    fn route(&self, path: &str) -> Result<&dyn StagingStore> {
        if !path.starts_with(s3::SCHEME) {
            return Ok(&self.local);
        }
        match &self.s3 {
            Some(s3) => Ok(s3.as_ref()),
            None => Err(LoaderError::Staging(format!(
                "{} is an S3 path but no S3 staging is configured",
                path
            ))),
        }
    }
}

#[async_trait]
impl StagingStore for StagingRouter {
    async fn list(&self, path: &str) -> Result<Vec<String>> {
        self.route(path)?.list(path).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.route(path)?.read(path).await
    }

    async fn delete_recursive(&self, path: &str) -> Result<()> {
        self.route(path)?.delete_recursive(path).await
    }
}
