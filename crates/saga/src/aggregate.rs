//! Workflow instance aggregate.

use std::collections::{BTreeMap, HashMap};

use common::WorkflowId;
use domain::{Aggregate, OrderConfirmation, PizzaOrder};
use history::Version;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::compensation::{CompensationEntry, CompensationStack};
use crate::error::{StepFailure, WorkflowFailure};
use crate::events::WorkflowEvent;
use crate::order_fulfillment;
use crate::state::WorkflowState;

/// An event-sourced workflow instance.
///
/// Rebuilt from history on every resume. Holds the step outputs recorded so
/// far, so committed steps are replayed instead of re-executed, and the
/// compensation ledger with the entries already resolved.
#[derive(Debug, Clone, Default)]
pub struct WorkflowInstance {
    id: Option<WorkflowId>,
    version: Version,
    workflow_type: String,
    input: Option<PizzaOrder>,
    state: WorkflowState,
    current_step: Option<String>,
    attempts: BTreeMap<String, u32>,
    completed_steps: Vec<String>,
    outputs: HashMap<String, serde_json::Value>,
    compensations: Vec<CompensationEntry>,
    resolved_compensations: Vec<String>,
    primary_failure: Option<StepFailure>,
    compensation_failures: Vec<StepFailure>,
    confirmation: Option<OrderConfirmation>,
    failure: Option<WorkflowFailure>,
}

impl Aggregate for WorkflowInstance {
    type Event = WorkflowEvent;

    fn aggregate_type() -> &'static str {
        order_fulfillment::WORKFLOW_TYPE
    }

    fn id(&self) -> Option<&WorkflowId> {
        self.id.as_ref()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            WorkflowEvent::WorkflowStarted(data) => {
                self.id = Some(data.workflow_id);
                self.workflow_type = data.workflow_type;
                self.input = Some(data.input);
                self.state = WorkflowState::Pending;
            }
            WorkflowEvent::StepStarted(data) => {
                if self.state == WorkflowState::Pending {
                    self.state = WorkflowState::Running;
                }
                self.current_step = Some(data.step_name);
            }
            WorkflowEvent::AttemptStarted(data) => {
                self.attempts.insert(data.step_name, data.attempt);
            }
            WorkflowEvent::StepCompleted(data) => {
                self.current_step = None;
                self.outputs.insert(data.step_name.clone(), data.output);
                self.completed_steps.push(data.step_name);
            }
            WorkflowEvent::CompensationRegistered(entry) => {
                self.compensations.push(entry);
            }
            WorkflowEvent::StepFailed(data) => {
                self.primary_failure = Some(data.failure);
            }
            WorkflowEvent::CompensationStarted(_) => {
                self.state = WorkflowState::Compensating;
                self.current_step = None;
            }
            WorkflowEvent::CompensationCompleted(data) => {
                self.resolved_compensations.push(data.step_name);
            }
            WorkflowEvent::CompensationFailed(data) => {
                self.resolved_compensations.push(data.step_name);
                self.compensation_failures.push(data.failure);
            }
            WorkflowEvent::WorkflowCompleted(data) => {
                self.state = WorkflowState::Completed;
                self.current_step = None;
                self.confirmation = Some(data.confirmation);
            }
            WorkflowEvent::WorkflowFailed(data) => {
                self.state = WorkflowState::Failed;
                self.failure = Some(data.failure);
            }
        }
    }
}

// Query methods
impl WorkflowInstance {
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    /// Returns the workflow input, once started.
    pub fn input(&self) -> Option<&PizzaOrder> {
        self.input.as_ref()
    }

    /// Returns the step in flight, if any.
    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    /// Returns the latest attempt number recorded for an activity.
    pub fn attempts(&self, activity: &str) -> u32 {
        self.attempts.get(activity).copied().unwrap_or(0)
    }

    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    pub fn is_step_completed(&self, step: &str) -> bool {
        self.outputs.contains_key(step)
    }

    /// Decodes a committed step's recorded output. `None` if the step has
    /// not committed.
    pub fn step_output<T: DeserializeOwned>(
        &self,
        step: &str,
    ) -> Option<Result<T, serde_json::Error>> {
        self.outputs
            .get(step)
            .map(|value| serde_json::from_value(value.clone()))
    }

    /// Returns true if a compensation was registered for the step.
    pub fn has_compensation(&self, step: &str) -> bool {
        self.compensations.iter().any(|e| e.step == step)
    }

    /// Compensations registered and not yet resolved, in forward order.
    pub fn pending_compensations(&self) -> CompensationStack {
        let mut stack = CompensationStack::new();
        for entry in &self.compensations {
            if !self.resolved_compensations.contains(&entry.step) {
                stack.push(entry.clone());
            }
        }
        stack
    }

    /// Returns the failure that started compensation.
    pub fn primary_failure(&self) -> Option<&StepFailure> {
        self.primary_failure.as_ref()
    }

    /// Compensation failures recorded so far.
    pub fn compensation_failures(&self) -> &[StepFailure] {
        &self.compensation_failures
    }

    pub fn confirmation(&self) -> Option<&OrderConfirmation> {
        self.confirmation.as_ref()
    }

    /// Returns the terminal failure, once failed.
    pub fn failure(&self) -> Option<&WorkflowFailure> {
        self.failure.as_ref()
    }

    /// Returns a serializable view of the instance.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            workflow_id: self.id.clone(),
            workflow_type: self.workflow_type.clone(),
            state: self.state,
            version: self.version.as_i64(),
            current_step: self.current_step.clone(),
            attempts: self.attempts.clone(),
            completed_steps: self.completed_steps.clone(),
            compensation_stack: self.pending_compensations().entries().to_vec(),
            resolved_compensations: self.resolved_compensations.clone(),
            failure: self.failure.clone(),
            confirmation: self.confirmation.clone(),
        }
    }
}

/// Diagnostic view of a workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: Option<WorkflowId>,
    pub workflow_type: String,
    pub state: WorkflowState,
    /// Number of history records.
    pub version: i64,
    pub current_step: Option<String>,
    /// Latest attempt number per activity.
    pub attempts: BTreeMap<String, u32>,
    pub completed_steps: Vec<String>,
    /// Pending compensations, in forward order.
    pub compensation_stack: Vec<CompensationEntry>,
    /// Forward steps whose compensation has already run.
    pub resolved_compensations: Vec<String>,
    pub failure: Option<WorkflowFailure>,
    pub confirmation: Option<OrderConfirmation>,
}
