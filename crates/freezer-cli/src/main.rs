//! Freezer CLI (freezerctl)
//!
//! Command-line tool for inspecting and maintaining a remote freezer dataset.
//!
//! ## Overview
//!
//! `freezerctl` opens the dataset directly (there is no server) and runs one
//! operation against it:
//! - **Inspection**: frozen count, buffered tail, durable marker, metrics
//! - **Lookup**: print one field of one record
//! - **Maintenance**: truncate, repair
//! - **Bulk transfer**: import / export JSON-lines files
//!
//! ## Quick Start
//!
//! ```bash
//! # Work against a local directory
//! freezerctl --local-dir ./freezer import records.jsonl
//! freezerctl --local-dir ./freezer status
//! freezerctl --local-dir ./freezer get header 42
//!
//! # Work against S3 (credentials from the usual AWS_* variables)
//! export FREEZER_BUCKET=chain-ancients
//! freezerctl truncate 1000
//! freezerctl export 0 100 --output head.jsonl
//! ```
//!
//! ## Configuration
//!
//! - `FREEZER_BUCKET`, `FREEZER_S3_ENDPOINT`, `AWS_REGION`: S3 remote
//! - `FREEZER_LOCAL_DIR`: Local directory remote (takes precedence over S3)
//! - `FREEZER_GROUP_SIZE` and the other `FREEZER_*` variables: see `FreezerConfig`
//! - `RUST_LOG`: Log filter (default: warn); logs go to stderr
//!
//! Every command that changes the dataset ends with a Sync, so nothing stays
//! in the write buffer when the process exits.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use freezer_core::FieldKind;
use freezer_storage::{Freezer, FreezerConfig};
use std::path::PathBuf;

mod commands;
mod format;
mod store;

use format::Output;
use store::Backend;

#[derive(Parser)]
#[command(name = "freezerctl")]
#[command(about = "Ancient record freezer command-line tool", long_about = None)]
struct Cli {
    /// S3 bucket holding the dataset
    #[arg(long, env = "FREEZER_BUCKET")]
    bucket: Option<String>,

    /// S3-compatible endpoint (MinIO, LocalStack)
    #[arg(long, env = "FREEZER_S3_ENDPOINT")]
    endpoint: Option<String>,

    /// S3 region
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Use a local directory instead of S3
    #[arg(long, env = "FREEZER_LOCAL_DIR")]
    local_dir: Option<PathBuf>,

    /// Records per group (overrides FREEZER_GROUP_SIZE)
    #[arg(long)]
    group_size: Option<u64>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show frozen count, write buffer and durable marker
    Status {
        /// Also print Prometheus metrics for this run
        #[arg(long)]
        metrics: bool,
    },
    /// Print one field of a record as 0x-hex
    Get {
        /// Field kind: hashes, headers, bodies, receipts, diffs
        kind: FieldKind,
        /// Record number
        number: u64,
    },
    /// Discard every record numbered TARGET or higher
    Truncate {
        /// New frozen count
        target: u64,
    },
    /// Reconcile the index marker with the stored groups
    Repair,
    /// Append records from a JSON-lines file
    Import {
        /// File with one record object per line
        path: PathBuf,
        /// Records appended per batch before syncing
        #[arg(long, default_value = "1024")]
        batch: usize,
    },
    /// Write records [FROM, TO) as JSON lines
    Export {
        /// First record number
        from: u64,
        /// One past the last record number
        to: u64,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    fn backend(&self) -> Result<Backend> {
        if let Some(dir) = &self.local_dir {
            return Ok(Backend::Local(dir.clone()));
        }
        match &self.bucket {
            Some(bucket) => Ok(Backend::S3 {
                bucket: bucket.clone(),
                endpoint: self.endpoint.clone(),
                region: self.region.clone(),
            }),
            None => anyhow::bail!("No remote configured: pass --bucket or --local-dir"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    freezer_observability::init();

    let mut config = FreezerConfig::from_env().context("Invalid FREEZER_* configuration")?;
    if let Some(group_size) = cli.group_size {
        config.group_size = group_size;
    }

    let backend = cli.backend()?;
    tracing::info!(backend = %backend, group_size = config.group_size, "Opening dataset");
    let remote = store::build_remote(&backend)?;
    let freezer = Freezer::open(remote, config)
        .await
        .with_context(|| format!("Failed to open freezer at {backend}"))?;

    let output = Output::new(cli.json);
    match cli.command {
        Commands::Status { metrics } => commands::status(&freezer, &output, metrics).await?,
        Commands::Get { kind, number } => commands::get(&freezer, &output, kind, number).await?,
        Commands::Truncate { target } => commands::truncate(&freezer, &output, target).await?,
        Commands::Repair => commands::repair(&freezer, &output).await?,
        Commands::Import { path, batch } => {
            commands::import(&freezer, &output, &path, batch).await?
        }
        Commands::Export { from, to, output: path } => {
            commands::export(&freezer, &output, from, to, path.as_deref()).await?
        }
    }

    Ok(())
}
