//! Health Check API Handler

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::state::AppState;

/// GET /health
/// Reports liveness and the number of runs executing in this process
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "active_runs": state.active_runs.len(),
        })),
    )
}
