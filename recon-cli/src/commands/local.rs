//! Local command handlers
//!
//! `check` validates documents offline; `run` executes a pipeline in-process
//! against the source and target systems, without a server.

use anyhow::{Context, Result};
use colored::*;
use recon_core::domain::mapping::{SchemaMapping, SystemId};
use recon_core::domain::pipeline::Step;
use recon_engine::pool::postgres::PgConnectorFactory;
use recon_engine::recorder::NoopRecorder;
use recon_engine::{EngineConfig, PipelineRunner, RunContext, loader, rewriter};
use std::path::Path;
use std::sync::Arc;

use super::ensure_success;
use crate::config::Config;
use crate::output;

/// Validate a pipeline definition and show what each step will query on the target
pub fn check(pipeline: &Path, mapping: Option<&Path>) -> Result<()> {
    let definition = loader::load_definition(pipeline)
        .with_context(|| format!("Pipeline {} is invalid", pipeline.display()))?;
    let mapping = load_mapping(mapping)?;

    println!(
        "{} Pipeline '{}' is valid ({} steps)",
        "✓".green(),
        definition.name.bold(),
        definition.steps.len()
    );
    if let Some(description) = &definition.description {
        println!("  {}", description.dimmed());
    }
    println!();

    for (index, step) in definition.steps.iter().enumerate() {
        let validator = match step.validator() {
            Some(kind) => kind.as_str().cyan(),
            None => format!("{} (unknown, will be skipped)", step.validator_type).yellow(),
        };
        println!(
            "  {:>3}. {} [{}] timeout {}s",
            index + 1,
            step.name,
            validator,
            step.timeout(&definition.settings).as_secs()
        );
        if let Some(target) = target_preview(step, &mapping) {
            println!("       target: {}", target.dimmed());
        }
    }

    if mapping.is_empty() {
        println!("\n{}", "No schema mapping: target queries run unchanged.".yellow());
    } else {
        println!("\n{}", format!("Schema mapping ({} entries):", mapping.len()).bold());
        for (source, target) in mapping.iter() {
            println!("  {} -> {}", source, target.cyan());
        }
    }

    Ok(())
}

/// Execute a pipeline in-process and print its report
///
/// Ctrl-C cancels the run before its next step.
pub async fn run(
    config: &Config,
    pipeline: &Path,
    mapping: Option<&Path>,
    risk: Option<&Path>,
    json: bool,
) -> Result<()> {
    let (source_url, target_url) = config.system_urls()?;
    let definition = loader::load_definition(pipeline)
        .with_context(|| format!("Pipeline {} is invalid", pipeline.display()))?;
    let mapping = load_mapping(mapping)?;
    let risk_profile = risk
        .map(loader::load_risk_profile)
        .transpose()
        .context("Failed to load risk profile")?
        .unwrap_or_default();

    let engine_config = EngineConfig::from_env();
    engine_config.validate().context("Invalid engine configuration")?;
    tracing::debug!(
        "Running '{}' locally ({} steps, {} mapping entries)",
        definition.name,
        definition.steps.len(),
        mapping.len()
    );

    let connectors = PgConnectorFactory::new(source_url, target_url, engine_config.connect_timeout);
    let (ctx, cancel) = RunContext::new(definition, mapping, Arc::new(connectors), Arc::new(NoopRecorder));
    let ctx = ctx.with_risk_profile(risk_profile);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling after the current step...".yellow());
            cancel.cancel();
        }
    });

    let report = PipelineRunner::new(engine_config).execute(ctx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_run_header(&report.run);
        output::print_step_table(&report.steps);
        output::print_root_causes(&report.root_causes);
        output::print_risk(&report.risk);
    }

    ensure_success(&report.run)
}

fn load_mapping(path: Option<&Path>) -> Result<SchemaMapping> {
    match path {
        Some(path) => loader::load_mapping(path)
            .with_context(|| format!("Failed to load schema mapping {}", path.display())),
        None => Ok(SchemaMapping::default()),
    }
}

/// The query or table a step will use on the target system
fn target_preview(step: &Step, mapping: &SchemaMapping) -> Option<String> {
    let text = |target_key: &str, source_key: &str| {
        step.config
            .get(target_key)
            .or_else(|| step.config.get(source_key))
            .and_then(|v| v.as_str())
    };
    if let Some(query) = text("target_query", "query") {
        return Some(rewriter::rewrite(query, mapping, SystemId::Target));
    }
    text("target_table", "source_table").map(|table| rewriter::rewrite_table(table, mapping, SystemId::Target))
}
