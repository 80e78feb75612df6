//! The compensation stack: undo actions for committed steps, unwound in
//! reverse order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classifier::ActivityError;
use crate::error::{SagaError, WorkflowFailure};
use crate::executor::{ActivityContext, ActivityExecutor, ActivityOptions};
use crate::journal::ExecutionJournal;
use crate::order_fulfillment;

/// The undo actions the workflow knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompensationAction {
    /// Puts reserved pizzas back into inventory.
    RevertInventory,
    /// Refunds a bill that was sent.
    RefundCustomer,
}

impl CompensationAction {
    /// Name of the activity that performs this action.
    pub fn activity_name(&self) -> &'static str {
        match self {
            CompensationAction::RevertInventory => order_fulfillment::ACTIVITY_REVERT_INVENTORY,
            CompensationAction::RefundCustomer => order_fulfillment::ACTIVITY_REFUND_CUSTOMER,
        }
    }
}

/// An undo action registered after its forward step committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationEntry {
    /// The forward step being compensated.
    pub step: String,
    pub action: CompensationAction,
    /// Input captured when the entry was registered.
    pub input: serde_json::Value,
}

impl CompensationEntry {
    pub fn new<T: Serialize>(
        step: impl Into<String>,
        action: CompensationAction,
        input: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            step: step.into(),
            action,
            input: serde_json::to_value(input)?,
        })
    }

    /// Decodes the captured input.
    pub fn input<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.input.clone())
    }
}

/// Performs compensation actions.
#[async_trait]
pub trait CompensationRunner: Send + Sync {
    async fn run(&self, ctx: ActivityContext, entry: CompensationEntry) -> Result<(), ActivityError>;
}

/// Ordered ledger of pending compensations; insertion order is forward
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompensationStack {
    entries: Vec<CompensationEntry>,
}

impl CompensationStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&mut self, entry: CompensationEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in forward order.
    pub fn entries(&self) -> &[CompensationEntry] {
        &self.entries
    }

    /// Runs every pending compensation, most recent first.
    ///
    /// A failed compensation is added to `failure` and unwinding continues
    /// with the next entry. Each resolution is journaled before the next
    /// entry runs. Only journal errors abort the unwind.
    #[tracing::instrument(skip_all, fields(pending = self.entries.len(), primary = %failure.reason()))]
    pub async fn unwind_all<R, J>(
        &mut self,
        mut failure: WorkflowFailure,
        executor: &ActivityExecutor,
        options: &ActivityOptions,
        runner: &R,
        journal: &mut J,
    ) -> Result<WorkflowFailure, SagaError>
    where
        R: CompensationRunner + ?Sized,
        J: ExecutionJournal + ?Sized,
    {
        while let Some(entry) = self.entries.pop() {
            let activity = entry.action.activity_name();
            tracing::info!(step = %entry.step, activity, "running compensation");

            let call_entry = entry.clone();
            let result = executor
                .execute(activity, entry.input.clone(), options, journal, move |ctx, _| {
                    runner.run(ctx, call_entry.clone())
                })
                .await;

            match result {
                Ok(()) => {
                    metrics::counter!("compensations_executed_total", "activity" => activity)
                        .increment(1);
                    journal.compensation_resolved(&entry, None).await?;
                }
                Err(SagaError::Step(step_failure)) => {
                    tracing::warn!(
                        step = %entry.step,
                        activity,
                        reason = %step_failure.reason(),
                        "compensation failed, continuing unwind"
                    );
                    metrics::counter!("compensation_failures_total", "activity" => activity)
                        .increment(1);
                    journal
                        .compensation_resolved(&entry, Some(&step_failure))
                        .await?;
                    failure.compensation_failures.push(step_failure);
                }
                Err(other) => {
                    // Put it back so a resumed unwind still sees it.
                    self.entries.push(entry);
                    return Err(other);
                }
            }
        }
        Ok(failure)
    }
}
