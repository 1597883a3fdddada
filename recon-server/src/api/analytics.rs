//! Analytics API Handlers
//!
//! HTTP endpoints for run history, trends and baselines of a pipeline.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use recon_core::domain::analysis::RunSummary;
use recon_core::dto::analytics::{AnalyticsReport, SetBaseline, WindowQuery};

use crate::api::error::ApiResult;
use crate::service::analytics_service;
use crate::state::AppState;

/// GET /api/pipelines/{name}/runs?window=N
/// List the N most recent finished runs, oldest first
pub async fn list_runs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Json<Vec<RunSummary>>> {
    tracing::debug!("Listing last {} runs of pipeline: {}", query.window, name);

    let runs = analytics_service::list_runs(&state.db, &name, query.window).await?;

    Ok(Json(runs))
}

/// GET /api/pipelines/{name}/analytics?window=N
/// Trends, velocity and summary over the N most recent runs
pub async fn get_analytics(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Json<AnalyticsReport>> {
    tracing::debug!("Computing analytics over {} runs of pipeline: {}", query.window, name);

    let report = analytics_service::get_analytics(&state.db, &name, query.window).await?;

    Ok(Json(report))
}

/// PUT /api/pipelines/{name}/baseline
/// Pin a run as the comparison anchor of the pipeline
pub async fn set_baseline(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SetBaseline>,
) -> ApiResult<StatusCode> {
    tracing::info!("Setting baseline of pipeline {} to run {}", name, req.run_id);

    analytics_service::set_baseline(&state.db, &name, req).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/pipelines/{name}/baseline
/// Clear the pinned baseline
pub async fn clear_baseline(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<StatusCode> {
    tracing::info!("Clearing baseline of pipeline: {}", name);

    analytics_service::clear_baseline(&state.db, &name).await?;

    Ok(StatusCode::NO_CONTENT)
}
