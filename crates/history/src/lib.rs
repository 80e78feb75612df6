//! Workflow history storage.
//!
//! Every workflow instance owns one append-only stream of [`HistoryRecord`]s.
//! The orchestrator appends a record before each side effect it performs, and
//! rebuilds the instance from the stream when it resumes.

pub mod error;
pub mod memory;
pub mod record;
pub mod store;

pub use common::WorkflowId;
pub use error::{HistoryError, Result};
pub use memory::InMemoryHistoryStore;
pub use record::{HistoryRecord, HistoryRecordBuilder, RecordId, Version};
pub use store::{AppendOptions, HistoryStore, HistoryStoreExt};
