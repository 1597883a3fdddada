//! Run API Handlers
//!
//! HTTP endpoints for the run lifecycle.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use recon_core::domain::analysis::RootCauseGroup;
use recon_core::dto::run::{RunAccepted, RunDetail, SubmitRun};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::run_service;
use crate::state::AppState;

/// POST /api/runs
/// Validate a pipeline definition and start a run for it
pub async fn submit_run(
    State(state): State<AppState>,
    Json(req): Json<SubmitRun>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    tracing::info!(
        "Submitting run for pipeline: {} ({} steps)",
        req.definition.name,
        req.definition.steps.len()
    );

    let accepted = run_service::submit_run(&state, req).await?;

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /api/runs/{id}
/// Get a run and its step results
pub async fn get_run(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<RunDetail>> {
    tracing::debug!("Getting run: {}", id);

    let detail = run_service::get_run(&state.db, id).await?;

    Ok(Json(detail))
}

/// POST /api/runs/{id}/cancel
/// Stop a run before its next step
pub async fn cancel_run(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    tracing::info!("Cancelling run: {}", id);

    run_service::cancel_run(&state, id).await?;

    Ok(StatusCode::ACCEPTED)
}

/// GET /api/runs/{id}/root-causes
/// Get the root-cause groups of a finished run
pub async fn get_root_causes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<RootCauseGroup>>> {
    tracing::debug!("Getting root causes of run: {}", id);

    let groups = run_service::get_root_causes(&state.db, id).await?;

    Ok(Json(groups))
}
