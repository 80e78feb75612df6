//! Shared identifiers used across the workspace.

mod types;

pub use types::WorkflowId;
