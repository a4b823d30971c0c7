//! Postgres-backed manifest (`load_manifest` table)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::debug;

use super::ManifestStore;
use crate::error::Result;
use crate::model::{CursorValue, ManifestRecord, ManifestUpdate};

const UPSERT_SQL: &str = r#"
    INSERT INTO load_manifest (
        table_name, last_point_value, iterate_column_type,
        status, replication_method, error_message, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, NOW())
    ON CONFLICT (table_name) DO UPDATE SET
        last_point_value = COALESCE(EXCLUDED.last_point_value, load_manifest.last_point_value),
        iterate_column_type =
            COALESCE(EXCLUDED.iterate_column_type, load_manifest.iterate_column_type),
        status = EXCLUDED.status,
        replication_method = EXCLUDED.replication_method,
        error_message = EXCLUDED.error_message,
        updated_at = NOW()
"#;

#[derive(Debug, sqlx::FromRow)]
struct ManifestRow {
    table_name: String,
    last_point_value: Option<CursorValue>,
    iterate_column_type: Option<String>,
    status: String,
    replication_method: String,
    error_message: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ManifestRow> for ManifestRecord {
    type Error = crate::error::LoaderError;

    fn try_from(row: ManifestRow) -> Result<Self> {
        Ok(ManifestRecord {
            table_name: row.table_name,
            last_point_value: row.last_point_value,
            iterate_column_type: row.iterate_column_type,
            status: row.status.parse()?,
            replication_method: row.replication_method.parse()?,
            error_message: row.error_message,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgManifestStore {
    pool: PgPool,
}

impl PgManifestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }

    /// Create the manifest table if it is missing
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ManifestStore for PgManifestStore {
    async fn update(&self, update: &ManifestUpdate) -> Result<()> {
        debug!(
            table = %update.table_name,
            status = %update.status,
            "Writing manifest row"
        );

        sqlx::query(UPSERT_SQL)
            .bind(&update.table_name)
            .bind(&update.last_point_value)
            .bind(&update.iterate_column_type)
            .bind(update.status.as_str())
            .bind(update.replication_method.as_str())
            .bind(&update.error_message)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get(&self, table_name: &str) -> Result<Option<ManifestRecord>> {
        let row = sqlx::query_as::<_, ManifestRow>(
            r#"
            SELECT table_name, last_point_value, iterate_column_type,
                   status, replication_method, error_message, updated_at
            FROM load_manifest
            WHERE table_name = $1
            "#,
        )
        .bind(table_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ManifestRecord::try_from).transpose()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
