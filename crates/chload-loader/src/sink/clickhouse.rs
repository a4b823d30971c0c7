//! ClickHouse sink over the HTTP interface
//!
//! Each chunk is one `INSERT ... FORMAT JSONEachRow` request.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::{chunks, TabularWriteSink, WriteMode};
use crate::destination::{ConnectionParams, Destination};
use crate::error::{LoaderError, Result};
use crate::table::{Table, TimestampStyle};

pub struct ClickHouseSink {
    client: Client,
    connection: ConnectionParams,
}

impl ClickHouseSink {
    pub fn new(connection: ConnectionParams, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, connection })
    }

    /// Backquoted `database.table`; a dotted target names its own database
    fn qualified_name(&self, target: &str) -> String {
        let (database, table) = target
            .split_once('.')
            .unwrap_or((self.connection.database.as_str(), target));
        format!("{}.{}", quote_ident(database), quote_ident(table))
    }

    fn insert_query(&self, target: &str, table: &Table) -> String {
        let columns = table
            .columns()
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) FORMAT JSONEachRow",
            self.qualified_name(target),
            columns
        )
    }
}

fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('\\', "\\\\").replace('`', "\\`"))
}

#[async_trait]
impl TabularWriteSink for ClickHouseSink {
    fn destination(&self) -> Destination {
        Destination::ClickHouse
    }

    async fn write(
        &self,
        table: &Table,
        target: &str,
        mode: WriteMode,
        batch_size: u32,
    ) -> Result<u64> {
        let query = self.insert_query(target, table);
        let url = self.connection.http_url();
        let mut written = 0u64;

        for (index, chunk) in chunks(table.rows(), batch_size)?.enumerate() {
            let mut body = String::new();
            for object in table.row_objects(chunk, TimestampStyle::SpaceSeparated) {
                body.push_str(&serde_json::to_string(&object)?);
                body.push('\n');
            }

            debug!(
                table = target,
                chunk = index,
                rows = chunk.len(),
                mode = mode.as_str(),
                "Sending insert"
            );

            let response = self
                .client
                .post(&url)
                .query(&[
                    ("query", query.as_str()),
                    ("date_time_input_format", "best_effort"),
                ])
                .basic_auth(&self.connection.user, Some(&self.connection.password))
                .body(body)
                .send()
                .await
                .map_err(|e| LoaderError::write(target, e))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(LoaderError::write(
                    target,
                    format!("HTTP {}: {}", status.as_u16(), text.trim()),
                ));
            }

            written += chunk.len() as u64;
        }

        info!(table = target, rows = written, "ClickHouse insert finished");
        Ok(written)
    }
}
