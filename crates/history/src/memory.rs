use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    HistoryError, HistoryRecord, Result, Version, WorkflowId,
    store::{AppendOptions, HistoryStore, validate_records_for_append},
};

/// In-memory history store.
///
/// Histories live only as long as the process. Cloning the store shares the
/// underlying streams, so a resumed engine built from a clone sees the same
/// history as the original.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    streams: Arc<RwLock<HashMap<WorkflowId, Vec<HistoryRecord>>>>,
}

impl InMemoryHistoryStore {
    /// Creates a new empty in-memory history store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored across all workflows.
    pub async fn record_count(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }

    /// Drops every stored history.
    pub async fn clear(&self) {
        self.streams.write().await.clear();
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, records: Vec<HistoryRecord>, options: AppendOptions) -> Result<Version> {
        validate_records_for_append(&records)?;

        let workflow_id = records[0].workflow_id.clone();
        let first_new_version = records[0].version;

        let mut streams = self.streams.write().await;
        let stream = streams.entry(workflow_id.clone()).or_default();

        let current_version = stream
            .last()
            .map(|r| r.version)
            .unwrap_or(Version::initial());

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            metrics::counter!("history_concurrency_conflicts_total").increment(1);
            return Err(HistoryError::ConcurrencyConflict {
                workflow_id,
                expected,
                actual: current_version,
            });
        }

        if first_new_version != current_version.next() {
            return Err(HistoryError::ConcurrencyConflict {
                workflow_id,
                expected: options.expected_version.unwrap_or(current_version),
                actual: current_version,
            });
        }

        let last_version = records
            .last()
            .map(|r| r.version)
            .unwrap_or(current_version);
        tracing::trace!(%workflow_id, version = %last_version, count = records.len(), "appended history");
        stream.extend(records);

        Ok(last_version)
    }

    async fn read_history(&self, workflow_id: &WorkflowId) -> Result<Vec<HistoryRecord>> {
        let streams = self.streams.read().await;
        Ok(streams.get(workflow_id).cloned().unwrap_or_default())
    }

    async fn get_workflow_version(&self, workflow_id: &WorkflowId) -> Result<Option<Version>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(workflow_id)
            .and_then(|stream| stream.last())
            .map(|r| r.version))
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowId>> {
        let streams = self.streams.read().await;
        let mut ids: Vec<WorkflowId> = streams
            .iter()
            .filter(|(_, stream)| !stream.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
