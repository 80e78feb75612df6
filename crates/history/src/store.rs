use async_trait::async_trait;

use crate::{HistoryError, HistoryRecord, Result, Version, WorkflowId};

/// Options for appending records to a workflow's history.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected current version of the history for optimistic concurrency
    /// control. If None, no version check is performed.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the history to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the workflow to have no history yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Storage for workflow histories.
///
/// Implementations must be thread-safe: many workflow instances append to
/// the same store concurrently, each to its own stream.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends records to a workflow's history.
    ///
    /// Records are appended atomically. If `options.expected_version` is set
    /// and does not match the current version, fails with
    /// `ConcurrencyConflict`.
    ///
    /// Returns the new version of the history.
    async fn append(&self, records: Vec<HistoryRecord>, options: AppendOptions) -> Result<Version>;

    /// Reads the full history of a workflow, oldest record first.
    async fn read_history(&self, workflow_id: &WorkflowId) -> Result<Vec<HistoryRecord>>;

    /// Returns the current version of a workflow's history, or None if the
    /// workflow has never been started.
    async fn get_workflow_version(&self, workflow_id: &WorkflowId) -> Result<Option<Version>>;

    /// Lists the IDs of every workflow with recorded history.
    async fn list_workflows(&self) -> Result<Vec<WorkflowId>>;
}

/// Extension trait providing convenience methods for history stores.
#[async_trait]
pub trait HistoryStoreExt: HistoryStore {
    /// Appends a single record.
    async fn append_record(&self, record: HistoryRecord, options: AppendOptions) -> Result<Version> {
        self.append(vec![record], options).await
    }

    /// Checks if a workflow has any recorded history.
    async fn workflow_exists(&self, workflow_id: &WorkflowId) -> Result<bool> {
        Ok(self.get_workflow_version(workflow_id).await?.is_some())
    }
}

impl<T: HistoryStore + ?Sized> HistoryStoreExt for T {}

/// Validates a batch of records before appending.
pub fn validate_records_for_append(records: &[HistoryRecord]) -> Result<()> {
    let Some(first) = records.first() else {
        return Err(HistoryError::InvalidAppend(
            "Cannot append empty record list".to_string(),
        ));
    };

    for record in records.iter().skip(1) {
        if record.workflow_id != first.workflow_id {
            return Err(HistoryError::InvalidAppend(
                "All records must belong to the same workflow".to_string(),
            ));
        }
    }

    let mut expected_version = first.version;
    for record in records.iter().skip(1) {
        expected_version = expected_version.next();
        if record.version != expected_version {
            return Err(HistoryError::InvalidAppend(format!(
                "Record versions must be sequential. Expected {}, got {}",
                expected_version, record.version
            )));
        }
    }

    Ok(())
}
