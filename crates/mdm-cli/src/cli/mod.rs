//! CLI for the MDM download job manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use mdm_core::config;
use mdm_core::persist::JsonSnapshotStore;
use mdm_core::store::JobStore;
use std::path::PathBuf;
use std::sync::Arc;

use commands::{run_add, run_clear, run_completions, run_downloads, run_remove, run_status};

/// Top-level CLI for the MDM download job manager.
#[derive(Debug, Parser)]
#[command(name = "mdm")]
#[command(about = "MDM: media download job manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Add a media URL as a new queued job.
    Add {
        /// Page or media URL to download.
        url: String,
    },

    /// Run queued jobs until the queue drains.
    Run {
        /// Run up to N downloads concurrently (defaults to the configured limit).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        /// Destination directory (defaults to the configured one, then the current directory).
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
    },

    /// Show jobs, optionally filtered.
    Status {
        /// Substring matched against title, URL and file names.
        #[arg(long)]
        query: Option<String>,
        /// Only jobs with these file extensions (repeatable).
        #[arg(long = "ext", value_name = "EXT")]
        extensions: Vec<String>,
        /// Only jobs from these source domains (repeatable).
        #[arg(long = "domain", value_name = "DOMAIN")]
        domains: Vec<String>,
    },

    /// Remove a job by its id.
    Remove {
        /// Job identifier.
        id: String,
    },

    /// Remove all jobs.
    Clear,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Completions { shell } => run_completions(shell),
            command => {
                let cfg = config::load_or_init()?;
                cfg.validate()?;
                tracing::debug!("loaded config: {:?}", cfg);
                let snapshots = JsonSnapshotStore::open_default()?;
                let store = Arc::new(JobStore::open(Box::new(snapshots))?);

                match command {
                    CliCommand::Add { url } => run_add(&store, &url),
                    CliCommand::Run { jobs, download_dir } => {
                        run_downloads(store, &cfg, jobs, download_dir).await
                    }
                    CliCommand::Status {
                        query,
                        extensions,
                        domains,
                    } => run_status(&store, query, extensions, domains),
                    CliCommand::Remove { id } => run_remove(&store, &id),
                    CliCommand::Clear => run_clear(&store),
                    CliCommand::Completions { .. } => unreachable!("handled above"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
