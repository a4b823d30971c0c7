//! Destination write path
//!
//! A sink owns its connection descriptor and appends a [`Table`] to a target
//! table in chunks of at most `batch_size` rows.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::destination::{ConnectionParams, Destination};
use crate::error::{LoaderError, Result};
use crate::table::Table;

pub mod clickhouse;
pub mod postgres;

pub use clickhouse::ClickHouseSink;
pub use postgres::PostgresSink;

/// How rows land in the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert alongside existing rows
    Append,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Append => "append",
        }
    }
}

/// Persists tables into the destination store
#[async_trait]
pub trait TabularWriteSink: Send + Sync {
    fn destination(&self) -> Destination;

    /// Write every row of `table` into `target`; returns rows written
    async fn write(
        &self,
        table: &Table,
        target: &str,
        mode: WriteMode,
        batch_size: u32,
    ) -> Result<u64>;
}

/// Split `rows` into chunks of at most `batch_size`
pub(crate) fn chunks<T>(rows: &[T], batch_size: u32) -> Result<std::slice::Chunks<'_, T>> {
    if batch_size == 0 {
        return Err(LoaderError::InvalidBatch("batch size must be positive".to_string()));
    }
    Ok(rows.chunks(batch_size as usize))
}

/// Destination settings the sink is built from
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    pub connection: ConnectionParams,
    pub http_timeout: Duration,
}

/// Build the sink for the configured destination
pub async fn build_sink(config: &DestinationConfig) -> Result<Arc<dyn TabularWriteSink>> {
    match config.connection.destination {
        Destination::ClickHouse => Ok(Arc::new(ClickHouseSink::new(
            config.connection.clone(),
            config.http_timeout,
        )?)),
        Destination::Postgres => Ok(Arc::new(PostgresSink::connect(&config.connection).await?)),
        Destination::MySql => Err(LoaderError::Config(format!(
            "no native sink for {}; use a JDBC-capable writer with {}",
            Destination::MySql,
            config.connection.redacted_jdbc_url()
        ))),
    }
}
