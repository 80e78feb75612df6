//! Prometheus metrics endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use history::HistoryStore;

use super::workflows::AppState;

/// GET /metrics — returns Prometheus-formatted metrics.
///
/// The `workflows_running` gauge is sampled on each scrape.
pub async fn get<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    metrics::gauge!("workflows_running").set(state.engine.running_count() as f64);

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
}
