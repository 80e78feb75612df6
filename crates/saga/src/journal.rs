//! Recording workflow progress in history.

use async_trait::async_trait;
use common::WorkflowId;
use domain::{Aggregate, DomainEvent, PizzaOrder};
use history::{AppendOptions, HistoryError, HistoryRecord, HistoryStore, HistoryStoreExt};

use crate::aggregate::WorkflowInstance;
use crate::compensation::CompensationEntry;
use crate::error::{SagaError, StepFailure};
use crate::events::WorkflowEvent;
use crate::executor::ActivityInvocation;
use crate::order_fulfillment;

/// Receives execution facts that must be durable before the work they
/// describe happens.
#[async_trait]
pub trait ExecutionJournal: Send {
    /// Called before each activity attempt runs.
    async fn attempt_started(&mut self, invocation: &ActivityInvocation) -> Result<(), SagaError>;

    /// The highest attempt number already recorded for `activity`, or 0.
    fn recorded_attempts(&self, _activity: &str) -> u32 {
        0
    }

    /// Called once a compensation has succeeded or failed terminally.
    async fn compensation_resolved(
        &mut self,
        _entry: &CompensationEntry,
        _failure: Option<&StepFailure>,
    ) -> Result<(), SagaError> {
        Ok(())
    }
}

/// A journal that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopJournal;

#[async_trait]
impl ExecutionJournal for NoopJournal {
    async fn attempt_started(&mut self, _invocation: &ActivityInvocation) -> Result<(), SagaError> {
        Ok(())
    }
}

/// Writes workflow events to a [`HistoryStore`] and keeps the in-memory
/// [`WorkflowInstance`] in step with what was written.
///
/// Every append expects the version of the last event this journal saw, so
/// two evaluators racing on one workflow cannot both make progress.
pub struct HistoryJournal<S> {
    store: S,
    workflow_id: WorkflowId,
    instance: WorkflowInstance,
}

impl<S: HistoryStore> HistoryJournal<S> {
    /// Creates the history of a new workflow.
    pub async fn create(store: S, workflow_id: WorkflowId, input: PizzaOrder) -> Result<Self, SagaError> {
        if store.workflow_exists(&workflow_id).await? {
            return Err(SagaError::AlreadyStarted(workflow_id));
        }

        let mut journal = Self {
            store,
            workflow_id: workflow_id.clone(),
            instance: WorkflowInstance::default(),
        };
        let started = WorkflowEvent::workflow_started(
            workflow_id.clone(),
            order_fulfillment::WORKFLOW_TYPE,
            input,
        );
        match journal.record(started).await {
            Ok(()) => Ok(journal),
            Err(SagaError::History(HistoryError::ConcurrencyConflict { .. })) => {
                Err(SagaError::AlreadyStarted(workflow_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Rebuilds a journal from recorded history. `None` if the workflow has
    /// no history.
    pub async fn load(store: S, workflow_id: WorkflowId) -> Result<Option<Self>, SagaError> {
        let Some(instance) = load_instance(&store, &workflow_id).await? else {
            return Ok(None);
        };
        Ok(Some(Self {
            store,
            workflow_id,
            instance,
        }))
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn instance(&self) -> &WorkflowInstance {
        &self.instance
    }

    /// Appends one event.
    pub async fn record(&mut self, event: WorkflowEvent) -> Result<(), SagaError> {
        self.record_all(vec![event]).await
    }

    /// Appends several events atomically.
    pub async fn record_all(&mut self, events: Vec<WorkflowEvent>) -> Result<(), SagaError> {
        let current = self.instance.version();
        let mut version = current;
        let mut records = Vec::with_capacity(events.len());
        for event in &events {
            version = version.next();
            records.push(
                HistoryRecord::builder()
                    .record_type(event.event_type())
                    .workflow_id(self.workflow_id.clone())
                    .workflow_type(order_fulfillment::WORKFLOW_TYPE)
                    .version(version)
                    .payload(event)?
                    .build()?,
            );
        }

        let new_version = self
            .store
            .append(records, AppendOptions::expect_version(current))
            .await?;

        self.instance.apply_events(events);
        self.instance.set_version(new_version);
        Ok(())
    }
}

#[async_trait]
impl<S: HistoryStore> ExecutionJournal for HistoryJournal<S> {
    async fn attempt_started(&mut self, invocation: &ActivityInvocation) -> Result<(), SagaError> {
        self.record(WorkflowEvent::attempt_started(
            invocation.step.clone(),
            invocation.attempt,
            invocation.elapsed.as_millis() as u64,
        ))
        .await
    }

    fn recorded_attempts(&self, activity: &str) -> u32 {
        self.instance.attempts(activity)
    }

    async fn compensation_resolved(
        &mut self,
        entry: &CompensationEntry,
        failure: Option<&StepFailure>,
    ) -> Result<(), SagaError> {
        let event = match failure {
            None => WorkflowEvent::compensation_completed(entry.step.clone()),
            Some(failure) => WorkflowEvent::compensation_failed(entry.step.clone(), failure.clone()),
        };
        self.record(event).await
    }
}

/// Replays a workflow's history into an instance.
pub async fn load_instance<S: HistoryStore + ?Sized>(
    store: &S,
    workflow_id: &WorkflowId,
) -> Result<Option<WorkflowInstance>, SagaError> {
    let records = store.read_history(workflow_id).await?;
    if records.is_empty() {
        return Ok(None);
    }

    let mut instance = WorkflowInstance::default();
    for record in records {
        let event: WorkflowEvent = serde_json::from_value(record.payload).map_err(|e| {
            SagaError::CorruptHistory(format!(
                "{} record at version {}: {e}",
                record.record_type, record.version
            ))
        })?;
        instance.apply(event);
        instance.set_version(record.version);
    }

    if instance.id() != Some(workflow_id) {
        return Err(SagaError::CorruptHistory(format!(
            "history of {workflow_id} does not begin with WorkflowStarted"
        )));
    }
    Ok(Some(instance))
}
