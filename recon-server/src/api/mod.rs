//! API Module
//!
//! HTTP API layer for the server.
//! Each submodule handles endpoints for a specific domain.

pub mod analytics;
pub mod error;
pub mod health;
pub mod run;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Run endpoints
        .route("/api/runs", post(run::submit_run))
        .route("/api/runs/{id}", get(run::get_run))
        .route("/api/runs/{id}/cancel", post(run::cancel_run))
        .route("/api/runs/{id}/root-causes", get(run::get_root_causes))
        // Pipeline analytics endpoints
        .route("/api/pipelines/{name}/runs", get(analytics::list_runs))
        .route("/api/pipelines/{name}/analytics", get(analytics::get_analytics))
        .route(
            "/api/pipelines/{name}/baseline",
            put(analytics::set_baseline).delete(analytics::clear_baseline),
        )
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
