//! Server-side run command handlers

use anyhow::{Context, Result};
use colored::*;
use recon_client::ReconClient;
use recon_core::dto::run::{RunDetail, SubmitRun};
use recon_engine::loader;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use super::ensure_success;
use crate::output;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Submit a pipeline to the server, optionally waiting for its results
pub async fn submit(client: &ReconClient, pipeline: &Path, mapping: Option<&Path>, wait: bool) -> Result<()> {
    let definition = loader::load_definition(pipeline)
        .with_context(|| format!("Pipeline {} is invalid", pipeline.display()))?;
    let mapping = mapping
        .map(loader::load_mapping)
        .transpose()
        .context("Failed to load schema mapping")?;

    let accepted = client
        .submit_run(&SubmitRun { definition, mapping })
        .await
        .context("Failed to submit run")?;

    println!(
        "{} Run {} accepted for pipeline '{}'",
        "✓".green(),
        accepted.run_id.to_string().cyan(),
        accepted.pipeline_name
    );

    if !wait {
        println!(
            "{}",
            format!("  Follow it with: recon show {}", accepted.run_id).dimmed()
        );
        return Ok(());
    }

    let detail = wait_for_run(client, accepted.run_id).await?;
    print_detail(client, &detail).await;
    ensure_success(&detail.run)
}

/// Show a run with its step results and root causes
pub async fn show(client: &ReconClient, run_id: Uuid) -> Result<()> {
    let detail = client.get_run(run_id).await.context("Failed to fetch run")?;
    print_detail(client, &detail).await;
    Ok(())
}

/// Ask the server to cancel a run
pub async fn cancel(client: &ReconClient, run_id: Uuid) -> Result<()> {
    client.cancel_run(run_id).await.context("Failed to cancel run")?;
    println!(
        "{} Cancellation requested for run {}; it stops before its next step",
        "✓".green(),
        run_id
    );
    Ok(())
}

async fn wait_for_run(client: &ReconClient, run_id: Uuid) -> Result<RunDetail> {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    let mut reported = 0;

    loop {
        interval.tick().await;
        let detail = client.get_run(run_id).await.context("Failed to poll run")?;

        for step in detail.steps.iter().skip(reported) {
            eprintln!("  {} {} {}", "•".dimmed(), step.step_name, step.status.as_str().dimmed());
        }
        reported = reported.max(detail.steps.len());

        if detail.run.status.is_terminal() {
            return Ok(detail);
        }
    }
}

async fn print_detail(client: &ReconClient, detail: &RunDetail) {
    output::print_run_header(&detail.run);
    output::print_step_table(&detail.steps);

    if detail.run.status.is_terminal() {
        match client.get_root_causes(detail.run.id).await {
            Ok(groups) => output::print_root_causes(&groups),
            Err(e) => eprintln!("{} {}", "Root causes unavailable:".yellow(), e),
        }
    }
}
