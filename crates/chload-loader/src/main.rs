//! chload - destination-side loader CLI

use anyhow::{bail, Context, Result};
use chload_common::logging::{init_logging, LogConfig, LogLevel};
use chload_loader::manifest::build_manifest_store;
use chload_loader::{BatchDescriptor, Config, LoadOutcome, Loader};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chload")]
#[command(author, version, about = "Load staged batches into the destination database")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load one or more batch descriptor files, in order
    Load {
        /// JSON file holding one batch descriptor or an array of them
        #[arg(short, long = "batch", required = true)]
        batches: Vec<PathBuf>,

        /// Load start time recorded in the provenance column (RFC 3339)
        #[arg(long)]
        start_time: Option<DateTime<Utc>>,
    },

    /// Show the manifest row for a table
    Status {
        table: String,
    },

    /// Print the destination JDBC URL (password masked)
    Url,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Many(Vec<BatchDescriptor>),
    One(BatchDescriptor),
}

fn read_batches(paths: &[PathBuf]) -> Result<Vec<BatchDescriptor>> {
    let mut batches = Vec::new();
    for path in paths {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read batch file {}", path.display()))?;
        let parsed: BatchFile = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid batch descriptor in {}", path.display()))?;
        match parsed {
            BatchFile::Many(many) => batches.extend(many),
            BatchFile::One(one) => batches.push(one),
        }
    }
    Ok(batches)
}

async fn run_load(
    config: &Config,
    batches: Vec<BatchDescriptor>,
    started_at: DateTime<Utc>,
) -> Result<()> {
    let loader = Loader::from_config(config)
        .await
        .context("Failed to initialize loader")?;

    let (mut loaded, mut skipped, mut handled) = (0usize, 0usize, 0usize);

    for batch in &batches {
        match loader.load(batch, started_at).await? {
            LoadOutcome::Loaded { .. } => loaded += 1,
            LoadOutcome::NoNewData => skipped += 1,
            LoadOutcome::Handled { failure } => {
                warn!(
                    table = %failure.table_name,
                    error = %failure.error,
                    "Table failed, continuing"
                );
                handled += 1;
            },
        }
    }

    info!(loaded, skipped, failed = handled, "Run finished");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("chload")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Load { batches, start_time } => {
            let batches = read_batches(&batches)?;
            if batches.is_empty() {
                bail!("No batch descriptors found");
            }
            run_load(&config, batches, start_time.unwrap_or_else(Utc::now)).await?;
        },
        Command::Status { table } => {
            let manifest = build_manifest_store(&config.manifest).await?;
            match manifest.get(&table).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => bail!("No manifest row for table {}", table),
            }
        },
        Command::Url => {
            let connection = &config.destination.connection;
            println!("{}", connection.redacted_jdbc_url());
            println!("{}", connection.destination.spec().jdbc_class);
        },
    }

    Ok(())
}
