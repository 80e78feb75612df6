use thiserror::Error;

use crate::{Version, WorkflowId};

/// Errors that can occur when interacting with the history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The expected version did not match the stream's current version.
    ///
    /// Two evaluators raced on the same workflow instance.
    #[error(
        "Concurrency conflict for workflow {workflow_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        workflow_id: WorkflowId,
        expected: Version,
        actual: Version,
    },

    /// The batch of records handed to `append` was malformed.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for history store operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
