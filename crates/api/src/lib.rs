//! HTTP API server with observability for the order-fulfillment saga engine.
//!
//! Provides REST endpoints to start, inspect, cancel and resume fulfillment
//! workflows, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use history::HistoryStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryServices, SagaConfig, SagaError, WorkflowEngine};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::workflows::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: HistoryStore + Clone + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/metrics", get(routes::metrics::get::<S>))
        .route("/workflows", post(routes::workflows::start::<S>))
        .route("/workflows", get(routes::workflows::list::<S>))
        .route("/workflows/{id}", get(routes::workflows::describe::<S>))
        .route("/workflows/{id}/cancel", post(routes::workflows::cancel::<S>))
        .route("/workflows/{id}/resume", post(routes::workflows::resume::<S>))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state backed by the simulated in-memory services.
///
/// The returned services share state with the engine's, so callers can
/// inspect or inject faults into them.
pub fn create_default_state<S: HistoryStore + Clone + 'static>(
    store: S,
    config: SagaConfig,
    metrics: PrometheusHandle,
) -> Result<(Arc<AppState<S>>, InMemoryServices), SagaError> {
    let services = InMemoryServices::new(config.discount);
    let engine = WorkflowEngine::new(store, services.activity_services(), config)?;
    Ok((Arc::new(AppState { engine, metrics }), services))
}

/// Waits up to `timeout` for the engine's running workflows to finish.
/// Returns how many were still running when it stopped waiting.
pub async fn drain_workflows<S>(engine: &WorkflowEngine<S>, timeout: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let running = engine.running_count();
        if running == 0 || tokio::time::Instant::now() >= deadline {
            return running;
        }
        tracing::debug!(running, "waiting for workflows to finish");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
