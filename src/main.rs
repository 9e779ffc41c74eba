//! Operator CLI over the checkpoint store: inspect investigations, render
//! audit reports, and apply retention operations. The agent loop itself is a
//! separate consumer of the library.

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use incident_reasoning::config::{Config, LogFormat};
use incident_reasoning::report::render_report;
use incident_reasoning::storage::{SqliteStorage, Storage};

#[derive(Parser)]
#[command(
    name = "incident-reasoning",
    version,
    about = "Inspect and manage incident investigation checkpoints"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all investigations with their latest checkpoint
    Investigations,
    /// List checkpoints for one investigation, newest first
    Checkpoints {
        /// Investigation id
        investigation_id: String,
    },
    /// Render an audit report for a checkpoint (latest if not specified)
    Report {
        /// Investigation id
        investigation_id: String,
        /// Specific checkpoint id
        #[arg(long)]
        checkpoint: Option<String>,
    },
    /// Delete one checkpoint, or all checkpoints for an investigation
    Delete {
        /// Investigation id
        investigation_id: String,
        /// Specific checkpoint id; omits to delete the whole investigation
        #[arg(long)]
        checkpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    let cli = Cli::parse();

    let storage = match SqliteStorage::new(
        &config.database,
        config.limits.max_checkpoints_per_investigation,
    )
    .await
    {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Checkpoint store opened");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to open checkpoint store");
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Investigations => {
            let investigations = storage.list_investigations().await?;
            if investigations.is_empty() {
                println!("No investigations found");
            }
            for summary in investigations {
                println!(
                    "{}  checkpoints: {}  latest: {} ({}, confidence {})",
                    summary.investigation_id,
                    summary.checkpoint_count,
                    summary.latest.id,
                    summary.latest.phase,
                    summary.latest.confidence,
                );
            }
        }
        Command::Checkpoints { investigation_id } => {
            let entries = storage.list_checkpoints(&investigation_id).await?;
            if entries.is_empty() {
                println!("No checkpoints found for {}", investigation_id);
            }
            for entry in entries {
                println!(
                    "{}  {}  {}  confidence {}  hypotheses {}",
                    entry.id,
                    entry.created_at.to_rfc3339(),
                    entry.phase,
                    entry.confidence,
                    entry.hypothesis_count,
                );
            }
        }
        Command::Report {
            investigation_id,
            checkpoint,
        } => {
            let loaded = match &checkpoint {
                Some(id) => storage.get_checkpoint(&investigation_id, id).await?,
                None => storage.latest_checkpoint(&investigation_id).await?,
            };
            match loaded {
                Some(checkpoint) => print!("{}", render_report(&checkpoint)),
                None => println!("Checkpoint not found"),
            }
        }
        Command::Delete {
            investigation_id,
            checkpoint,
        } => match checkpoint {
            Some(id) => {
                if storage.delete_checkpoint(&investigation_id, &id).await? {
                    println!("Deleted checkpoint {}", id);
                } else {
                    println!("Checkpoint not found");
                }
            }
            None => {
                let count = storage.delete_investigation(&investigation_id).await?;
                println!("Deleted {} checkpoints for {}", count, investigation_id);
            }
        },
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
