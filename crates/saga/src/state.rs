//! Workflow state machine.

use serde::{Deserialize, Serialize};

/// The state of a workflow instance in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Running ──┬──► Completed
///                       └──► Compensating ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WorkflowState {
    /// Instance created and input validated; no step has run yet.
    #[default]
    Pending,

    /// Forward steps are being executed.
    Running,

    /// A step failed terminally and compensations are being unwound.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// Compensation finished after a failure (terminal state).
    Failed,
}

impl WorkflowState {
    /// Returns true if forward steps may still run.
    pub fn can_run(&self) -> bool {
        matches!(self, WorkflowState::Pending | WorkflowState::Running)
    }

    /// Returns true if the workflow may enter or continue compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(
            self,
            WorkflowState::Pending | WorkflowState::Running | WorkflowState::Compensating
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Pending => "Pending",
            WorkflowState::Running => "Running",
            WorkflowState::Compensating => "Compensating",
            WorkflowState::Completed => "Completed",
            WorkflowState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
