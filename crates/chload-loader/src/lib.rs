//! chload Loader
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Destination-side load stage of an extract-load pipeline. A [`Loader`]
//! takes one [`BatchDescriptor`] of staged data, records progress in a shared
//! manifest, appends the rows to the destination table, and cleans up the
//! staging path once the write is safely recorded.
//!
//! # Components
//!
//! - [`manifest`]: per-table status and incremental cursor (Postgres or in-memory)
//! - [`parser`]: staged file formats, looked up by file-type tag
//! - [`sink`]: destination writers (ClickHouse HTTP, Postgres)
//! - [`staging`]: local and S3 staging access
//! - [`loader`]: the orchestrator and its failure policy
//!
//! # Example
//!
//! ```no_run
//! use chload_loader::{BatchDescriptor, Config, LoadOutcome, Loader};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let loader = Loader::from_config(&config).await?;
//!
//! let batch = BatchDescriptor::staged("orders", "csv", "/var/stage/orders");
//! match loader.load(&batch, chrono::Utc::now()).await? {
//!     LoadOutcome::Loaded { rows, .. } => println!("{rows} rows"),
//!     other => println!("{other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod destination;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod model;
pub mod parser;
pub mod sink;
pub mod staging;
pub mod table;

pub use config::Config;
pub use destination::{ConnectionParams, Destination};
pub use error::{LoadError, LoadFailure, LoadStep, LoaderError, Result};
pub use loader::{LoadOutcome, Loader, LoaderSettings};
pub use manifest::{InMemoryManifestStore, ManifestStore, PgManifestStore};
pub use model::{BatchDescriptor, ManifestRecord, ManifestStatus, ManifestUpdate, ReplicationMethod};
pub use parser::{ParserRegistry, StagedParser};
pub use sink::{TabularWriteSink, WriteMode};
pub use staging::{StagingRouter, StagingStore};
pub use table::{Table, Value};
