//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use history::HistoryStore;
use serde::Serialize;

use super::workflows::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub running_workflows: usize,
}

/// GET /health — returns engine health and load.
pub async fn check<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        running_workflows: state.engine.running_count(),
    })
}
