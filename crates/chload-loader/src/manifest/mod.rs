//! Manifest store: per-table load status and incremental cursor
//!
//! The manifest is shared, externally visible state. Every status change the
//! loader makes goes through [`ManifestStore::update`], an idempotent upsert
//! keyed by table name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{LoaderError, Result};
use crate::model::{ManifestRecord, ManifestUpdate};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryManifestStore;
pub use postgres::PgManifestStore;

/// Durable per-table load manifest
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Upsert the row for `update.table_name`
    ///
    /// `None` cursor fields leave the stored values untouched.
    async fn update(&self, update: &ManifestUpdate) -> Result<()>;

    async fn get(&self, table_name: &str) -> Result<Option<ManifestRecord>>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// Which manifest backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ManifestBackend {
    #[default]
    Postgres,
    Memory,
}

impl std::str::FromStr for ManifestBackend {
    type Err = LoaderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(ManifestBackend::Postgres),
            "memory" | "in-memory" => Ok(ManifestBackend::Memory),
            other => Err(LoaderError::Config(format!(
                "Unsupported manifest backend: {}",
                other
            ))),
        }
    }
}

/// Manifest backend connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestBackendConfig {
    pub backend: ManifestBackend,
    /// Connection URL; required for `postgres`
    pub url: Option<String>,
    pub max_connections: u32,
}

impl ManifestBackendConfig {
    pub fn memory() -> Self {
        Self {
            backend: ManifestBackend::Memory,
            url: None,
            max_connections: 1,
        }
    }
}

/// Build the manifest client once per process
pub async fn build_manifest_store(
    config: &ManifestBackendConfig,
) -> Result<Arc<dyn ManifestStore>> {
    let store: Arc<dyn ManifestStore> = match config.backend {
        ManifestBackend::Memory => Arc::new(InMemoryManifestStore::new()),
        ManifestBackend::Postgres => {
            let url = config.url.as_deref().ok_or_else(|| {
                LoaderError::Config("postgres manifest backend requires a URL".to_string())
            })?;
            let store = PgManifestStore::connect(url, config.max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        },
    };

    info!(backend = store.backend(), "Manifest store ready");
    Ok(store)
}
