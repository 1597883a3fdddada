//! Run Service
//!
//! Business logic for triggering, inspecting and cancelling runs.

use recon_core::domain::analysis::RootCauseGroup;
use recon_core::domain::run::Run;
use recon_core::dto::run::{RunAccepted, RunDetail, SubmitRun};
use recon_engine::analysis::{self, RULESET_VERSION};
use recon_engine::{PipelineRunner, RunContext, loader};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::recorder::PgRecorder;
use crate::repository::{analysis_repository, baseline_repository, run_repository, step_repository};
use crate::state::AppState;

/// Service error type
#[derive(Debug)]
pub enum RunError {
    NotFound(Uuid),
    ValidationError(String),
    InvalidState(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for RunError {
    fn from(err: sqlx::Error) -> Self {
        RunError::DatabaseError(err)
    }
}

/// Validate a submitted pipeline and start executing it in the background
///
/// The run row exists (as `pending`) before this returns, so the returned id
/// can be polled immediately.
pub async fn submit_run(state: &AppState, req: SubmitRun) -> Result<RunAccepted, RunError> {
    loader::validate_definition(&req.definition).map_err(|e| RunError::ValidationError(e.to_string()))?;

    let engine = &state.engine;
    let pipeline_name = req.definition.name.clone();
    let mapping = req.mapping.unwrap_or_else(|| engine.default_mapping.clone());

    let history =
        run_repository::find_recent_summaries(&state.db, &pipeline_name, engine.config.history_window).await?;
    let baseline = baseline_repository::find(&state.db, &pipeline_name).await?;

    let recorder = Arc::new(PgRecorder::new(state.db.clone()));
    let (ctx, cancel) = RunContext::new(req.definition, mapping, Arc::clone(&engine.connectors), recorder);
    let ctx = ctx
        .with_history(history, baseline)
        .with_risk_profile(engine.risk_profile.clone());
    let run_id = ctx.run_id;

    run_repository::upsert(&state.db, &Run::new(run_id, &pipeline_name)).await?;
    state.active_runs.insert(run_id, cancel);

    let runner = PipelineRunner::new(engine.config.clone());
    let active_runs = state.active_runs.clone();
    tokio::spawn(async move {
        match runner.execute(ctx).await {
            Ok(report) => tracing::info!(
                "Run {} finished: {} ({} root-cause groups, risk {:?})",
                run_id,
                report.run.status.as_str(),
                report.root_causes.len(),
                report.risk.level
            ),
            Err(e) => tracing::error!("Run {} aborted: {}", run_id, e),
        }
        active_runs.remove(run_id);
    });

    tracing::info!("Run {} accepted for pipeline: {}", run_id, pipeline_name);

    Ok(RunAccepted { run_id, pipeline_name })
}

/// Get a run with its step results
pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<RunDetail, RunError> {
    let run = run_repository::find_by_id(pool, id)
        .await?
        .ok_or(RunError::NotFound(id))?;
    let steps = step_repository::find_by_run(pool, id).await?;

    Ok(RunDetail { run, steps })
}

/// Request cancellation of a run executing in this process
///
/// Takes effect before the next step starts.
pub async fn cancel_run(state: &AppState, id: Uuid) -> Result<(), RunError> {
    if state.active_runs.cancel(id) {
        tracing::info!("Cancellation requested for run {}", id);
        return Ok(());
    }

    let run = run_repository::find_by_id(&state.db, id)
        .await?
        .ok_or(RunError::NotFound(id))?;

    Err(RunError::InvalidState(if run.status.is_terminal() {
        format!("Run {} already {}", id, run.status.as_str())
    } else {
        format!("Run {} is not executing on this server", id)
    }))
}

/// Root-cause groups of a finished run
///
/// Served from the analysis cache when it holds groups for the current
/// ruleset, otherwise recomputed from the stored step results.
pub async fn get_root_causes(pool: &PgPool, id: Uuid) -> Result<Vec<RootCauseGroup>, RunError> {
    let run = run_repository::find_by_id(pool, id)
        .await?
        .ok_or(RunError::NotFound(id))?;
    validate_finished(&run)?;

    match analysis_repository::find(pool, id, RULESET_VERSION).await {
        Ok(Some(groups)) => return Ok(groups),
        Ok(None) => tracing::debug!("No cached analysis for run {}", id),
        Err(e) => tracing::warn!("Failed to read analysis cache for run {}: {}", id, e),
    }

    let steps = step_repository::find_by_run(pool, id).await?;
    let groups = analysis::analyze(&steps);

    if let Err(e) = analysis_repository::upsert(pool, id, RULESET_VERSION, &groups).await {
        tracing::warn!("Failed to refresh analysis cache for run {}: {}", id, e);
    }

    Ok(groups)
}

fn validate_finished(run: &Run) -> Result<(), RunError> {
    if !run.status.is_terminal() {
        return Err(RunError::InvalidState(format!(
            "Run {} is still {}",
            run.id,
            run.status.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_finished() {
        let mut run = Run::new(Uuid::new_v4(), "nightly");
        assert!(matches!(validate_finished(&run), Err(RunError::InvalidState(_))));

        run.start().unwrap();
        assert!(matches!(validate_finished(&run), Err(RunError::InvalidState(_))));

        run.complete(&[]).unwrap();
        assert!(validate_finished(&run).is_ok());
    }
}
