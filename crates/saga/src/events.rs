//! Workflow history events.

use chrono::{DateTime, Utc};
use common::WorkflowId;
use domain::{DomainEvent, OrderConfirmation, PizzaOrder};
use serde::{Deserialize, Serialize};

use crate::compensation::CompensationEntry;
use crate::error::{StepFailure, WorkflowFailure};

/// Events recorded in a workflow's history.
///
/// Every transition and every activity attempt is recorded before the side
/// effect it describes runs, so replaying these events reconstructs exactly
/// how far an instance got.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkflowEvent {
    /// Workflow instance created with validated input.
    WorkflowStarted(WorkflowStartedData),

    /// A forward step began.
    StepStarted(StepData),

    /// An activity attempt is about to run.
    AttemptStarted(AttemptData),

    /// A forward step committed, with its output.
    StepCompleted(StepCompletedData),

    /// A compensation was registered for a committed step.
    CompensationRegistered(CompensationEntry),

    /// A forward step failed terminally.
    StepFailed(StepFailedData),

    /// Unwinding began.
    CompensationStarted(CompensationStartedData),

    /// A compensation ran successfully.
    CompensationCompleted(StepData),

    /// A compensation failed terminally (unwinding continues).
    CompensationFailed(StepFailedData),

    /// Workflow completed successfully.
    WorkflowCompleted(WorkflowCompletedData),

    /// Workflow failed after compensation.
    WorkflowFailed(WorkflowFailedData),
}

impl DomainEvent for WorkflowEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStarted(_) => "WorkflowStarted",
            WorkflowEvent::StepStarted(_) => "StepStarted",
            WorkflowEvent::AttemptStarted(_) => "AttemptStarted",
            WorkflowEvent::StepCompleted(_) => "StepCompleted",
            WorkflowEvent::CompensationRegistered(_) => "CompensationRegistered",
            WorkflowEvent::StepFailed(_) => "StepFailed",
            WorkflowEvent::CompensationStarted(_) => "CompensationStarted",
            WorkflowEvent::CompensationCompleted(_) => "CompensationCompleted",
            WorkflowEvent::CompensationFailed(_) => "CompensationFailed",
            WorkflowEvent::WorkflowCompleted(_) => "WorkflowCompleted",
            WorkflowEvent::WorkflowFailed(_) => "WorkflowFailed",
        }
    }
}

/// Data for WorkflowStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStartedData {
    pub workflow_id: WorkflowId,
    /// The type of workflow (e.g., "PizzaOrderFulfillment").
    pub workflow_type: String,
    pub input: PizzaOrder,
    pub started_at: DateTime<Utc>,
}

/// Data for events that only name a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepData {
    pub step_name: String,
}

/// Data for AttemptStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptData {
    /// The activity being attempted.
    pub step_name: String,
    pub attempt: u32,
    /// Milliseconds since the first attempt of this call started.
    pub elapsed_ms: u64,
}

/// Data for StepCompleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompletedData {
    pub step_name: String,
    /// The step's output, replayed instead of re-running the step.
    pub output: serde_json::Value,
}

/// Data for StepFailed and CompensationFailed events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailedData {
    /// The forward step the failure belongs to.
    pub step_name: String,
    pub failure: StepFailure,
}

/// Data for CompensationStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationStartedData {
    /// The step that triggered compensation.
    pub from_step: String,
    /// Compensations waiting to run.
    pub pending: usize,
}

/// Data for WorkflowCompleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowCompletedData {
    pub confirmation: OrderConfirmation,
    pub completed_at: DateTime<Utc>,
}

/// Data for WorkflowFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFailedData {
    pub failure: WorkflowFailure,
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl WorkflowEvent {
    pub fn workflow_started(
        workflow_id: WorkflowId,
        workflow_type: impl Into<String>,
        input: PizzaOrder,
    ) -> Self {
        WorkflowEvent::WorkflowStarted(WorkflowStartedData {
            workflow_id,
            workflow_type: workflow_type.into(),
            input,
            started_at: Utc::now(),
        })
    }

    pub fn step_started(step_name: impl Into<String>) -> Self {
        WorkflowEvent::StepStarted(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn attempt_started(step_name: impl Into<String>, attempt: u32, elapsed_ms: u64) -> Self {
        WorkflowEvent::AttemptStarted(AttemptData {
            step_name: step_name.into(),
            attempt,
            elapsed_ms,
        })
    }

    pub fn step_completed(step_name: impl Into<String>, output: serde_json::Value) -> Self {
        WorkflowEvent::StepCompleted(StepCompletedData {
            step_name: step_name.into(),
            output,
        })
    }

    pub fn compensation_registered(entry: CompensationEntry) -> Self {
        WorkflowEvent::CompensationRegistered(entry)
    }

    pub fn step_failed(failure: StepFailure) -> Self {
        WorkflowEvent::StepFailed(StepFailedData {
            step_name: failure.step.clone(),
            failure,
        })
    }

    pub fn compensation_started(from_step: impl Into<String>, pending: usize) -> Self {
        WorkflowEvent::CompensationStarted(CompensationStartedData {
            from_step: from_step.into(),
            pending,
        })
    }

    pub fn compensation_completed(step_name: impl Into<String>) -> Self {
        WorkflowEvent::CompensationCompleted(StepData {
            step_name: step_name.into(),
        })
    }

    /// `step_name` is the forward step whose compensation failed.
    pub fn compensation_failed(step_name: impl Into<String>, failure: StepFailure) -> Self {
        WorkflowEvent::CompensationFailed(StepFailedData {
            step_name: step_name.into(),
            failure,
        })
    }

    pub fn workflow_completed(confirmation: OrderConfirmation) -> Self {
        WorkflowEvent::WorkflowCompleted(WorkflowCompletedData {
            confirmation,
            completed_at: Utc::now(),
        })
    }

    pub fn workflow_failed(failure: WorkflowFailure) -> Self {
        WorkflowEvent::WorkflowFailed(WorkflowFailedData {
            failure,
            failed_at: Utc::now(),
        })
    }
}
