//! chload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, environment helpers, and logging setup for the
//! chload workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Environment**: typed environment variable lookups with defaults
//! - **Logging**: `tracing` subscriber initialization (console, file, JSON)
//!
//! # Example
//!
//! ```no_run
//! use chload_common::env;
//!
//! fn batch_size() -> chload_common::Result<u32> {
//!     env::parse_or("CHLOAD_BATCH_SIZE", 100_000)
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
