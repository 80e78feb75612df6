use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{HistoryError, WorkflowId};

/// Unique identifier for a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a new random record ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a record in a workflow's history, used for optimistic
/// concurrency control.
///
/// Versions start at 1 for the first record and increment by 1 for each
/// subsequent record of the same workflow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) of a workflow with no history.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first record.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One entry of a workflow's history: a serialized workflow event plus the
/// metadata needed to store and order it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Unique identifier for this record.
    pub record_id: RecordId,

    /// The type of the recorded event (e.g., "StepCompleted").
    pub record_type: String,

    /// The workflow instance this record belongs to.
    pub workflow_id: WorkflowId,

    /// The workflow type (e.g., "PizzaOrderFulfillment").
    pub workflow_type: String,

    /// The version of the workflow history after this record.
    pub version: Version,

    /// When the record was written.
    pub timestamp: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,
}

impl HistoryRecord {
    /// Creates a new history record builder.
    pub fn builder() -> HistoryRecordBuilder {
        HistoryRecordBuilder::default()
    }
}

/// Builder for constructing history records.
#[derive(Debug, Default)]
pub struct HistoryRecordBuilder {
    record_type: Option<String>,
    workflow_id: Option<WorkflowId>,
    workflow_type: Option<String>,
    version: Option<Version>,
    payload: Option<serde_json::Value>,
}

impl HistoryRecordBuilder {
    /// Sets the record type.
    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Sets the workflow ID.
    pub fn workflow_id(mut self, id: WorkflowId) -> Self {
        self.workflow_id = Some(id);
        self
    }

    /// Sets the workflow type.
    pub fn workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    /// Sets the version.
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the record, failing if a required field is missing.
    pub fn build(self) -> Result<HistoryRecord, HistoryError> {
        let missing = |field: &str| HistoryError::InvalidAppend(format!("{field} is required"));
        Ok(HistoryRecord {
            record_id: RecordId::new(),
            record_type: self.record_type.ok_or_else(|| missing("record_type"))?,
            workflow_id: self.workflow_id.ok_or_else(|| missing("workflow_id"))?,
            workflow_type: self.workflow_type.ok_or_else(|| missing("workflow_type"))?,
            version: self.version.ok_or_else(|| missing("version"))?,
            timestamp: Utc::now(),
            payload: self.payload.ok_or_else(|| missing("payload"))?,
        })
    }
}
