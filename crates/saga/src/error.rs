//! Saga error types.

use common::WorkflowId;
use domain::OrderError;
use history::HistoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::{Classification, ErrorKind, FailureDetail};
use crate::retry::GiveUpCause;
use crate::state::WorkflowState;

/// A step that failed terminally, after the executor resolved every retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("step '{step}' failed after {attempts} attempt(s) [{reason}]: {message}", reason = .classification.reason)]
pub struct StepFailure {
    pub step: String,
    pub classification: Classification,
    /// Attempts made. Zero for rules evaluated by the workflow itself.
    pub attempts: u32,
    pub cause: GiveUpCause,
    pub message: String,
}

impl StepFailure {
    /// A fatal failure decided by the orchestrator itself rather than by an
    /// activity: a violated business rule or a cancellation between steps.
    pub fn local(
        step: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
        detail: Option<FailureDetail>,
    ) -> Self {
        let mut classification = Classification::new(ErrorKind::Fatal, reason);
        classification.detail = detail;
        Self {
            step: step.into(),
            classification,
            attempts: 0,
            cause: GiveUpCause::Fatal,
            message: message.into(),
        }
    }

    /// Returns the reason code.
    pub fn reason(&self) -> &str {
        &self.classification.reason
    }

    pub fn kind(&self) -> ErrorKind {
        self.classification.kind
    }
}

/// The user-visible failure of a workflow: the step failure that started
/// the unwind plus every compensation that failed during it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFailure {
    pub primary: StepFailure,
    pub compensation_failures: Vec<StepFailure>,
}

impl WorkflowFailure {
    pub fn new(primary: StepFailure) -> Self {
        Self {
            primary,
            compensation_failures: Vec::new(),
        }
    }

    /// Returns the primary reason code.
    pub fn reason(&self) -> &str {
        self.primary.reason()
    }

    /// Returns the primary reason followed by each compensation failure's.
    pub fn reason_codes(&self) -> Vec<&str> {
        std::iter::once(self.primary.reason())
            .chain(self.compensation_failures.iter().map(StepFailure::reason))
            .collect()
    }

    /// Returns true if every compensation succeeded.
    pub fn fully_compensated(&self) -> bool {
        self.compensation_failures.is_empty()
    }
}

impl std::fmt::Display for WorkflowFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.primary)?;
        if !self.compensation_failures.is_empty() {
            write!(f, "; compensation failures: ")?;
            for (i, failure) in self.compensation_failures.iter().enumerate() {
                if i > 0 {
                    write!(f, "; ")?;
                }
                write!(f, "{failure}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for WorkflowFailure {}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step failed terminally. Seen by the orchestrator only; callers get
    /// `WorkflowFailed` once compensation has run.
    #[error(transparent)]
    Step(#[from] StepFailure),

    /// The workflow failed and has been compensated.
    #[error("Workflow failed: {0}")]
    WorkflowFailed(WorkflowFailure),

    /// The workflow input is malformed.
    #[error("Invalid workflow input: {0}")]
    InvalidInput(#[from] OrderError),

    /// The engine configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A workflow with this ID already has history.
    #[error("Workflow already started: {0}")]
    AlreadyStarted(WorkflowId),

    /// No history exists for this workflow ID.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    /// Workflow is in an invalid state for the requested operation.
    #[error("Invalid workflow state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: String,
        actual: WorkflowState,
    },

    /// The recorded history cannot be replayed.
    #[error("Corrupt workflow history: {0}")]
    CorruptHistory(String),

    /// History store error.
    #[error("History store error: {0}")]
    History(#[from] HistoryError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The workflow task panicked or was aborted.
    #[error("Workflow task aborted: {0}")]
    TaskAborted(String),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
