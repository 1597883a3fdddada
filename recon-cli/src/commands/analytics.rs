//! Analytics command handlers
//!
//! Run history, trends and baselines of a pipeline, read from the server.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use recon_client::ReconClient;
use uuid::Uuid;

use crate::output;

/// Baseline subcommands
#[derive(Subcommand)]
pub enum BaselineCommands {
    /// Pin a finished run as the pipeline's comparison anchor
    Set {
        /// Pipeline name
        pipeline: String,
        /// Run ID
        run_id: Uuid,
    },
    /// Clear the pipeline's baseline
    Clear {
        /// Pipeline name
        pipeline: String,
    },
}

/// List the most recent finished runs of a pipeline
pub async fn list_runs(client: &ReconClient, pipeline: &str, window: usize) -> Result<()> {
    let runs = client
        .list_runs(pipeline, window)
        .await
        .context("Failed to list runs")?;

    if runs.is_empty() {
        println!("{}", format!("No finished runs for pipeline '{}'.", pipeline).yellow());
    } else {
        println!(
            "{}",
            format!("Found {} run(s) for pipeline '{}':", runs.len(), pipeline).bold()
        );
        println!();
        output::print_run_summaries(&runs);
    }

    Ok(())
}

/// Show trends, velocity and summary of a pipeline
pub async fn show(client: &ReconClient, pipeline: &str, window: usize) -> Result<()> {
    let report = client
        .get_analytics(pipeline, window)
        .await
        .context("Failed to fetch analytics")?;

    output::print_analytics(&report);

    Ok(())
}

/// Handle baseline commands
pub async fn handle_baseline_command(client: &ReconClient, command: BaselineCommands) -> Result<()> {
    match command {
        BaselineCommands::Set { pipeline, run_id } => {
            client
                .set_baseline(&pipeline, run_id)
                .await
                .context("Failed to set baseline")?;
            println!(
                "{} Run {} is now the baseline of '{}'",
                "✓".green(),
                run_id.to_string().cyan(),
                pipeline
            );
        }
        BaselineCommands::Clear { pipeline } => {
            client
                .clear_baseline(&pipeline)
                .await
                .context("Failed to clear baseline")?;
            println!("{} Baseline of '{}' cleared", "✓".green(), pipeline);
        }
    }
    Ok(())
}
