//! Postgres sink
//!
//! Chunks are shipped as one JSONB array each and expanded server-side with
//! `jsonb_populate_recordset`, so column types come from the target table.

use async_trait::async_trait;
use serde_json::Value as Json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use super::{chunks, TabularWriteSink, WriteMode};
use crate::destination::{ConnectionParams, Destination};
use crate::error::{LoaderError, Result};
use crate::table::{Table, TimestampStyle};

#[derive(Debug, Clone)]
pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(connection: &ConnectionParams) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&connection.postgres_url())
            .await?;
        Ok(Self::new(pool))
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"schema"."table"` or `"table"`
fn qualified_name(target: &str) -> String {
    match target.split_once('.') {
        Some((schema, table)) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
        None => quote_ident(target),
    }
}

fn insert_sql(target: &str, table: &Table) -> String {
    let name = qualified_name(target);
    let columns = table
        .columns()
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {name} ({columns}) SELECT {columns} \
         FROM jsonb_populate_recordset(NULL::{name}, $1::jsonb)"
    )
}

#[async_trait]
impl TabularWriteSink for PostgresSink {
    fn destination(&self) -> Destination {
        Destination::Postgres
    }

    async fn write(
        &self,
        table: &Table,
        target: &str,
        mode: WriteMode,
        batch_size: u32,
    ) -> Result<u64> {
        let sql = insert_sql(target, table);
        let mut written = 0u64;

        for (index, chunk) in chunks(table.rows(), batch_size)?.enumerate() {
            let payload: Json = table
                .row_objects(chunk, TimestampStyle::Rfc3339)
                .map(Json::Object)
                .collect();

            debug!(
                table = target,
                chunk = index,
                rows = chunk.len(),
                mode = mode.as_str(),
                "Inserting chunk"
            );

            let result = sqlx::query(&sql)
                .bind(payload)
                .execute(&self.pool)
                .await
                .map_err(|e| LoaderError::write(target, e))?;

            written += result.rows_affected();
        }

        info!(table = target, rows = written, "Postgres insert finished");
        Ok(written)
    }
}
