//! Workflow start, inspection and control endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::WorkflowId;
use domain::PizzaOrder;
use history::HistoryStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::order_fulfillment::WORKFLOW_TYPE;
use saga::{WorkflowEngine, WorkflowSnapshot, WorkflowState};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub engine: WorkflowEngine<S>,
    pub metrics: PrometheusHandle,
}

// -- Request types --

#[derive(Deserialize)]
pub struct StartWorkflowRequest {
    /// Defaults to an ID derived from the order number.
    #[serde(default)]
    pub workflow_id: Option<String>,
    pub order: PizzaOrder,
}

// -- Response types --

#[derive(Serialize)]
pub struct WorkflowAcceptedResponse {
    pub workflow_id: String,
    pub workflow_type: &'static str,
}

#[derive(Serialize)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub state: WorkflowState,
    pub current_step: Option<String>,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub workflow_id: String,
    pub cancel_requested: bool,
}

// -- Handlers --

/// POST /workflows — validate an order and start fulfilling it.
///
/// Returns as soon as the workflow is recorded; poll `GET /workflows/{id}`
/// for progress.
#[tracing::instrument(skip(state, req))]
pub async fn start<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<StartWorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowAcceptedResponse>), ApiError> {
    let workflow_id = match req.workflow_id {
        Some(id) if id.trim().is_empty() => {
            return Err(ApiError::BadRequest("workflow_id must not be empty".to_string()));
        }
        Some(id) => WorkflowId::new(id),
        None => WorkflowId::for_order(&req.order.order_number),
    };

    let handle = state.engine.start(workflow_id, req.order).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(WorkflowAcceptedResponse {
            workflow_id: handle.workflow_id().to_string(),
            workflow_type: WORKFLOW_TYPE,
        }),
    ))
}

/// GET /workflows — list every workflow with its current state.
#[tracing::instrument(skip(state))]
pub async fn list<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<WorkflowSummary>>, ApiError> {
    let mut ids = state.engine.list().await?;
    ids.sort();

    let mut summaries = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(snapshot) = state.engine.describe(&id).await? {
            summaries.push(WorkflowSummary {
                workflow_id: id.to_string(),
                state: snapshot.state,
                current_step: snapshot.current_step,
            });
        }
    }

    Ok(Json(summaries))
}

/// GET /workflows/{id} — diagnostic view of one workflow.
#[tracing::instrument(skip(state))]
pub async fn describe<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowSnapshot>, ApiError> {
    let snapshot = state
        .engine
        .describe(&WorkflowId::new(id.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Workflow {id} not found")))?;

    Ok(Json(snapshot))
}

/// POST /workflows/{id}/cancel — cancel a running workflow.
///
/// Committed steps are compensated before the workflow fails.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    let workflow_id = WorkflowId::new(id);
    state.engine.cancel(&workflow_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            workflow_id: workflow_id.to_string(),
            cancel_requested: true,
        }),
    ))
}

/// POST /workflows/{id}/resume — re-evaluate a workflow from its history.
#[tracing::instrument(skip(state))]
pub async fn resume<S: HistoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<WorkflowAcceptedResponse>), ApiError> {
    let handle = state.engine.resume(WorkflowId::new(id)).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(WorkflowAcceptedResponse {
            workflow_id: handle.workflow_id().to_string(),
            workflow_type: WORKFLOW_TYPE,
        }),
    ))
}
