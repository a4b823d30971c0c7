//! Loader configuration
//!
//! Everything comes from environment variables (a `.env` file is honored),
//! with defaults suited to a local ClickHouse and Postgres.

use chload_common::env;
use std::time::Duration;

use crate::destination::{ConnectionParams, Destination};
use crate::error::{LoaderError, Result};
use crate::loader::LoaderSettings;
use crate::manifest::{ManifestBackend, ManifestBackendConfig};
use crate::sink::DestinationConfig;
use crate::staging::S3Config;
use crate::table::DEFAULT_PROVENANCE_COLUMN;

// ============================================================================
// Defaults
// ============================================================================

/// Default destination host.
pub const DEFAULT_DB_HOST: &str = "127.0.0.1";

/// Default destination user.
pub const DEFAULT_DB_USER: &str = "default";

/// Default destination database.
pub const DEFAULT_DB_DATABASE: &str = "default";

/// Default manifest database URL for local development.
pub const DEFAULT_MANIFEST_URL: &str = "postgresql://localhost/chload";

/// Default maximum manifest connections in the pool.
pub const DEFAULT_MANIFEST_MAX_CONNECTIONS: u32 = 4;

/// Default HTTP timeout for destination requests, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

/// Complete loader configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub destination: DestinationConfig,
    pub manifest: ManifestBackendConfig,
    pub loader: LoaderSettings,
    pub s3: S3Config,
}

impl Config {
    /// Load configuration from environment and defaults
    ///
    /// - `CHLOAD_DESTINATION`: clickhouse, postgres, mysql
    /// - `CHLOAD_DB_HOST`, `CHLOAD_DB_PORT`, `CHLOAD_DB_USER`,
    ///   `CHLOAD_DB_PASSWORD`, `CHLOAD_DB_DATABASE`
    /// - `CHLOAD_MANIFEST_BACKEND`: postgres, memory
    /// - `CHLOAD_MANIFEST_URL` (falls back to `DATABASE_URL`),
    ///   `CHLOAD_MANIFEST_MAX_CONNECTIONS`
    /// - `CHLOAD_PROVENANCE_COLUMN`, `CHLOAD_HTTP_TIMEOUT_SECS`
    /// - `S3_ENDPOINT`, `S3_REGION`, `S3_ACCESS_KEY`, `S3_SECRET_KEY`, `S3_PATH_STYLE`
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let destination: Destination = env::var_or("CHLOAD_DESTINATION", "clickhouse").parse()?;

        let config = Config {
            destination: DestinationConfig {
                connection: ConnectionParams {
                    destination,
                    host: env::var_or("CHLOAD_DB_HOST", DEFAULT_DB_HOST),
                    port: env::parse_or("CHLOAD_DB_PORT", destination.spec().default_port)?,
                    user: env::var_or("CHLOAD_DB_USER", DEFAULT_DB_USER),
                    password: env::var_or("CHLOAD_DB_PASSWORD", ""),
                    database: env::var_or("CHLOAD_DB_DATABASE", DEFAULT_DB_DATABASE),
                },
                http_timeout: Duration::from_secs(env::parse_or(
                    "CHLOAD_HTTP_TIMEOUT_SECS",
                    DEFAULT_HTTP_TIMEOUT_SECS,
                )?),
            },
            manifest: ManifestBackendConfig {
                backend: env::var_or("CHLOAD_MANIFEST_BACKEND", "postgres").parse()?,
                url: env::var_opt("CHLOAD_MANIFEST_URL")
                    .or_else(|| env::var_opt("DATABASE_URL"))
                    .or_else(|| Some(DEFAULT_MANIFEST_URL.to_string())),
                max_connections: env::parse_or(
                    "CHLOAD_MANIFEST_MAX_CONNECTIONS",
                    DEFAULT_MANIFEST_MAX_CONNECTIONS,
                )?,
            },
            loader: LoaderSettings {
                provenance_column: env::var_or(
                    "CHLOAD_PROVENANCE_COLUMN",
                    DEFAULT_PROVENANCE_COLUMN,
                ),
            },
            s3: S3Config::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let connection = &self.destination.connection;

        if connection.host.trim().is_empty() {
            return Err(LoaderError::Config("Destination host cannot be empty".to_string()));
        }

        if connection.port == 0 {
            return Err(LoaderError::Config("Destination port must be greater than 0".to_string()));
        }

        if connection.database.trim().is_empty() {
            return Err(LoaderError::Config("Destination database cannot be empty".to_string()));
        }

        if self.loader.provenance_column.trim().is_empty() {
            return Err(LoaderError::Config("Provenance column name cannot be empty".to_string()));
        }

        if self.manifest.backend == ManifestBackend::Postgres {
            if self.manifest.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                return Err(LoaderError::Config("Manifest URL cannot be empty".to_string()));
            }
            if self.manifest.max_connections == 0 {
                return Err(LoaderError::Config(
                    "Manifest max_connections must be greater than 0".to_string(),
                ));
            }
        }

        if self.destination.http_timeout.is_zero() {
            tracing::warn!("HTTP timeout is 0; destination requests will fail immediately");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let destination = Destination::ClickHouse;
        Self {
            destination: DestinationConfig {
                connection: ConnectionParams {
                    destination,
                    host: DEFAULT_DB_HOST.to_string(),
                    port: destination.spec().default_port,
                    user: DEFAULT_DB_USER.to_string(),
                    password: String::new(),
                    database: DEFAULT_DB_DATABASE.to_string(),
                },
                http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            },
            manifest: ManifestBackendConfig {
                backend: ManifestBackend::Postgres,
                url: Some(DEFAULT_MANIFEST_URL.to_string()),
                max_connections: DEFAULT_MANIFEST_MAX_CONNECTIONS,
            },
            loader: LoaderSettings::default(),
            s3: S3Config {
                endpoint: None,
                region: "us-east-1".to_string(),
                access_key: None,
                secret_key: None,
                path_style: false,
            },
        }
    }
}
