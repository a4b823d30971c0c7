//! Local filesystem staging

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

use super::StagingStore;
use crate::error::{LoaderError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStaging;

#[async_trait]
impl StagingStore for LocalStaging {
    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let root = PathBuf::from(path);

        let files = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut files = Vec::new();
            for entry in WalkDir::new(&root).follow_links(true) {
                let entry = entry.map_err(|e| {
                    LoaderError::Staging(format!("cannot walk {}: {}", root.display(), e))
                })?;
                if entry.file_type().is_file() {
                    files.push(entry.path().to_string_lossy().into_owned());
                }
            }
            files.sort();
            Ok(files)
        })
        .await
        .map_err(|e| LoaderError::Staging(format!("listing task failed: {}", e)))??;

        debug!(path, files = files.len(), "Listed local staging");
        Ok(files)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn delete_recursive(&self, path: &str) -> Result<()> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }

        debug!(path, "Deleted local staging");
        Ok(())
    }
}
