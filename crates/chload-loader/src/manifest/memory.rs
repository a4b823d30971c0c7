//! Process-local manifest for tests and dry runs

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::ManifestStore;
use crate::error::Result;
use crate::model::{ManifestRecord, ManifestUpdate};

#[derive(Debug, Default)]
pub struct InMemoryManifestStore {
    rows: RwLock<HashMap<String, ManifestRecord>>,
}

impl InMemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a row directly
    pub async fn insert(&self, record: ManifestRecord) {
        self.rows
            .write()
            .await
            .insert(record.table_name.clone(), record);
    }
}

#[async_trait]
impl ManifestStore for InMemoryManifestStore {
    async fn update(&self, update: &ManifestUpdate) -> Result<()> {
        let mut rows = self.rows.write().await;
        let next = ManifestRecord::apply(rows.get(&update.table_name), update, Utc::now());
        rows.insert(update.table_name.clone(), next);
        Ok(())
    }

    async fn get(&self, table_name: &str) -> Result<Option<ManifestRecord>> {
        Ok(self.rows.read().await.get(table_name).cloned())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
