//! Analytics Service
//!
//! Read side over recorded runs: history, trends and baselines.

use recon_core::domain::analysis::RunSummary;
use recon_core::dto::analytics::{AnalyticsReport, SetBaseline};
use recon_engine::analysis;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{baseline_repository, run_repository};

/// Largest window a caller may request
pub const MAX_WINDOW: usize = 500;

/// Service error type
#[derive(Debug)]
pub enum AnalyticsError {
    RunNotFound(Uuid),
    BaselineNotFound(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for AnalyticsError {
    fn from(err: sqlx::Error) -> Self {
        AnalyticsError::DatabaseError(err)
    }
}

/// The `window` most recent finished runs of a pipeline, oldest first
pub async fn list_runs(pool: &PgPool, pipeline_name: &str, window: usize) -> Result<Vec<RunSummary>, AnalyticsError> {
    validate_window(window)?;
    let runs = run_repository::find_recent_summaries(pool, pipeline_name, window).await?;
    Ok(runs)
}

/// Trend, velocity and summary over the `window` most recent runs
///
/// A pipeline with no history yields an empty report rather than an error.
pub async fn get_analytics(
    pool: &PgPool,
    pipeline_name: &str,
    window: usize,
) -> Result<AnalyticsReport, AnalyticsError> {
    validate_window(window)?;
    let runs = run_repository::find_recent_summaries(pool, pipeline_name, window).await?;

    // analytics degrade rather than fail when the baseline cannot be read
    let baseline = baseline_repository::find(pool, pipeline_name)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to read baseline of pipeline '{}': {}", pipeline_name, e);
            None
        });

    Ok(analysis::analytics_report(pipeline_name, window, runs, baseline))
}

/// Pin a finished run of the pipeline as its baseline
pub async fn set_baseline(pool: &PgPool, pipeline_name: &str, req: SetBaseline) -> Result<(), AnalyticsError> {
    let run = run_repository::find_by_id(pool, req.run_id)
        .await?
        .ok_or(AnalyticsError::RunNotFound(req.run_id))?;

    if run.pipeline_name != pipeline_name {
        return Err(AnalyticsError::ValidationError(format!(
            "Run {} belongs to pipeline '{}', not '{}'",
            run.id, run.pipeline_name, pipeline_name
        )));
    }
    if !run.status.is_terminal() {
        return Err(AnalyticsError::ValidationError(format!(
            "Run {} is still {} and cannot be a baseline",
            run.id,
            run.status.as_str()
        )));
    }

    baseline_repository::upsert(pool, pipeline_name, run.id).await?;
    tracing::info!("Pinned run {} as baseline of pipeline '{}'", run.id, pipeline_name);

    Ok(())
}

/// Clear the baseline of a pipeline
pub async fn clear_baseline(pool: &PgPool, pipeline_name: &str) -> Result<(), AnalyticsError> {
    if !baseline_repository::delete(pool, pipeline_name).await? {
        return Err(AnalyticsError::BaselineNotFound(pipeline_name.to_string()));
    }
    tracing::info!("Cleared baseline of pipeline '{}'", pipeline_name);
    Ok(())
}

fn validate_window(window: usize) -> Result<(), AnalyticsError> {
    if window == 0 || window > MAX_WINDOW {
        return Err(AnalyticsError::ValidationError(format!(
            "window must be between 1 and {}",
            MAX_WINDOW
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_window_bounds() {
        assert!(validate_window(1).is_ok());
        assert!(validate_window(MAX_WINDOW).is_ok());
        assert!(matches!(validate_window(0), Err(AnalyticsError::ValidationError(_))));
        assert!(matches!(
            validate_window(MAX_WINDOW + 1),
            Err(AnalyticsError::ValidationError(_))
        ));
    }
}
