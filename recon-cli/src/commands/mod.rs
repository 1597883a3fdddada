//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod analytics;
mod local;
mod remote;

pub use analytics::BaselineCommands;

use anyhow::{Result, bail};
use clap::Subcommand;
use recon_client::ReconClient;
use recon_core::domain::run::{Run, RunStatus};
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Validate a pipeline definition (and mapping) without connecting anywhere
    Check {
        /// Pipeline definition file (.yaml, .yml or .json)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Schema mapping file
        #[arg(short, long)]
        mapping: Option<PathBuf>,
    },
    /// Execute a pipeline locally against the source and target systems
    Run {
        /// Pipeline definition file (.yaml, .yml or .json)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Schema mapping file
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Risk profile file
        #[arg(short, long)]
        risk: Option<PathBuf>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Submit a pipeline for execution on the server
    Submit {
        /// Pipeline definition file (.yaml, .yml or .json)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Schema mapping file; the server's mapping is used when omitted
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Wait for the run to finish and print its results
        #[arg(short, long)]
        wait: bool,
    },
    /// Show a run recorded on the server
    Show {
        /// Run ID
        run_id: Uuid,
    },
    /// Cancel a run executing on the server
    Cancel {
        /// Run ID
        run_id: Uuid,
    },
    /// List the most recent finished runs of a pipeline
    Runs {
        /// Pipeline name
        pipeline: String,

        /// Number of runs
        #[arg(short, long, default_value_t = 10)]
        window: usize,
    },
    /// Trends, velocity and summary of a pipeline
    Analytics {
        /// Pipeline name
        pipeline: String,

        /// Number of runs
        #[arg(short, long, default_value_t = 10)]
        window: usize,
    },
    /// Manage the baseline run of a pipeline
    Baseline {
        #[command(subcommand)]
        command: BaselineCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = ReconClient::new(&config.server_url);

    match command {
        Commands::Check { pipeline, mapping } => local::check(&pipeline, mapping.as_deref()),
        Commands::Run {
            pipeline,
            mapping,
            risk,
            json,
        } => local::run(config, &pipeline, mapping.as_deref(), risk.as_deref(), json).await,
        Commands::Submit {
            pipeline,
            mapping,
            wait,
        } => remote::submit(&client, &pipeline, mapping.as_deref(), wait).await,
        Commands::Show { run_id } => remote::show(&client, run_id).await,
        Commands::Cancel { run_id } => remote::cancel(&client, run_id).await,
        Commands::Runs { pipeline, window } => analytics::list_runs(&client, &pipeline, window).await,
        Commands::Analytics { pipeline, window } => analytics::show(&client, &pipeline, window).await,
        Commands::Baseline { command } => analytics::handle_baseline_command(&client, command).await,
    }
}

/// Turns a failed run, or a run with failed steps, into a non-zero exit
fn ensure_success(run: &Run) -> Result<()> {
    if run.status == RunStatus::Failed {
        bail!(
            "Run {} failed: {}",
            run.id,
            run.failure_reason.as_deref().unwrap_or("unknown reason")
        );
    }
    if run.counters.failed_steps > 0 {
        bail!(
            "Run {}: {} of {} steps failed",
            run.id,
            run.counters.failed_steps,
            run.counters.total_steps
        );
    }
    Ok(())
}
