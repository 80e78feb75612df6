//! Workflow engine and the pizza order fulfillment orchestrator.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::WorkflowId;
use domain::{Address, Bill, ChargeStatus, Distance, OrderConfirmation, Pizza, PizzaOrder};
use history::HistoryStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::aggregate::WorkflowSnapshot;
use crate::cancellation::CancelSignal;
use crate::classifier::{ActivityError, FailureDetail, reason};
use crate::compensation::{CompensationAction, CompensationEntry};
use crate::config::SagaConfig;
use crate::error::{SagaError, StepFailure, WorkflowFailure};
use crate::events::WorkflowEvent;
use crate::executor::{ActivityContext, ActivityExecutor};
use crate::journal::{HistoryJournal, load_instance};
use crate::order_fulfillment::{
    STEP_CHECK_SERVICE_AREA, STEP_GET_DISTANCE, STEP_PROCESS_CREDIT_CARD, STEP_SEND_BILL,
    STEP_SETTLE, STEP_UPDATE_INVENTORY, WORKFLOW_TYPE,
};
use crate::services::ActivityServices;
use crate::state::WorkflowState;

type Running = Arc<Mutex<HashMap<WorkflowId, CancelSignal>>>;

/// Starts, resumes and inspects fulfillment workflows.
///
/// Each instance runs on its own tokio task. Instances share only the
/// history store and the activity services.
#[derive(Clone)]
pub struct WorkflowEngine<S> {
    store: S,
    services: ActivityServices,
    config: Arc<SagaConfig>,
    running: Running,
}

impl<S> WorkflowEngine<S>
where
    S: HistoryStore + Clone + 'static,
{
    /// Creates an engine, rejecting an unusable configuration.
    pub fn new(store: S, services: ActivityServices, config: SagaConfig) -> Result<Self, SagaError> {
        config.validate()?;
        if let Some(rule) = services
            .billing
            .discount_rule()
            .filter(|rule| *rule != config.discount)
        {
            return Err(SagaError::Config(format!(
                "billing applies {rule:?} but the configuration expects {:?}",
                config.discount
            )));
        }
        Ok(Self {
            store,
            services,
            config: Arc::new(config),
            running: Arc::default(),
        })
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Validates the input, records the new workflow and starts running it.
    ///
    /// Malformed input is rejected before any history is written.
    #[tracing::instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub async fn start(&self, workflow_id: WorkflowId, input: PizzaOrder) -> Result<WorkflowHandle, SagaError> {
        input.validate()?;
        let journal = HistoryJournal::create(self.store.clone(), workflow_id, input).await?;

        metrics::counter!("workflow_executions_total").increment(1);
        tracing::info!(workflow_type = WORKFLOW_TYPE, "workflow started");
        Ok(self.spawn(journal))
    }

    /// Re-evaluates a workflow from its recorded history.
    ///
    /// Committed steps are not re-invoked. A terminal workflow resolves
    /// immediately to its recorded outcome.
    #[tracing::instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub async fn resume(&self, workflow_id: WorkflowId) -> Result<WorkflowHandle, SagaError> {
        let journal = HistoryJournal::load(self.store.clone(), workflow_id.clone())
            .await?
            .ok_or(SagaError::WorkflowNotFound(workflow_id.clone()))?;

        if self.lock_running().contains_key(&workflow_id) {
            return Err(SagaError::InvalidState {
                expected: "a workflow not running in this engine".to_string(),
                actual: journal.instance().state(),
            });
        }

        tracing::info!(
            state = %journal.instance().state(),
            completed = journal.instance().completed_steps().len(),
            "resuming workflow"
        );
        Ok(self.spawn(journal))
    }

    /// Returns a diagnostic view of a workflow, or None if it does not exist.
    pub async fn describe(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowSnapshot>, SagaError> {
        Ok(load_instance(&self.store, workflow_id)
            .await?
            .map(|instance| instance.snapshot()))
    }

    /// Lists every workflow with recorded history.
    pub async fn list(&self) -> Result<Vec<WorkflowId>, SagaError> {
        Ok(self.store.list_workflows().await?)
    }

    /// Requests cancellation of a workflow running in this engine.
    pub async fn cancel(&self, workflow_id: &WorkflowId) -> Result<(), SagaError> {
        let signal = self.lock_running().get(workflow_id).cloned();
        if let Some(signal) = signal {
            tracing::info!(%workflow_id, "cancellation requested");
            signal.cancel();
            return Ok(());
        }

        match self.describe(workflow_id).await? {
            None => Err(SagaError::WorkflowNotFound(workflow_id.clone())),
            Some(snapshot) => Err(SagaError::InvalidState {
                expected: "a workflow running in this engine".to_string(),
                actual: snapshot.state,
            }),
        }
    }

    fn spawn(&self, journal: HistoryJournal<S>) -> WorkflowHandle {
        let workflow_id = journal.workflow_id().clone();
        let cancel = CancelSignal::new();
        self.lock_running().insert(workflow_id.clone(), cancel.clone());
        let registration = Registration {
            running: Arc::clone(&self.running),
            workflow_id: workflow_id.clone(),
        };

        let workflow = OrderFulfillment {
            journal,
            services: self.services.clone(),
            config: Arc::clone(&self.config),
            executor: ActivityExecutor::with_cancellation(cancel.clone()),
            cancel: cancel.clone(),
        };

        let span = tracing::info_span!("workflow", workflow_id = %workflow_id, workflow_type = WORKFLOW_TYPE);
        let task = tokio::spawn(
            async move {
                let _registration = registration;
                workflow.run().await
            }
            .instrument(span),
        );

        WorkflowHandle {
            workflow_id,
            cancel,
            task,
        }
    }
}

impl<S> WorkflowEngine<S> {
    /// Returns the number of workflows currently running in this engine.
    pub fn running_count(&self) -> usize {
        self.lock_running().len()
    }

    fn lock_running(&self) -> MutexGuard<'_, HashMap<WorkflowId, CancelSignal>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a workflow from the running set when its task ends, including
/// when the task is aborted.
struct Registration {
    running: Running,
    workflow_id: WorkflowId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.workflow_id);
    }
}

/// Handle to a running workflow instance.
#[derive(Debug)]
pub struct WorkflowHandle {
    workflow_id: WorkflowId,
    cancel: CancelSignal,
    task: JoinHandle<Result<OrderConfirmation, SagaError>>,
}

impl WorkflowHandle {
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    /// Requests cancellation. The in-flight attempt is abandoned and the
    /// workflow compensates what it has committed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the orchestrator task without recording anything, the way a
    /// crashed worker would. The workflow can be resumed from history.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the workflow to reach a terminal state.
    pub async fn outcome(self) -> Result<OrderConfirmation, SagaError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(SagaError::TaskAborted(e.to_string())),
        }
    }
}

/// One evaluation of a fulfillment workflow, driven from its history.
struct OrderFulfillment<S> {
    journal: HistoryJournal<S>,
    services: ActivityServices,
    config: Arc<SagaConfig>,
    executor: ActivityExecutor,
    cancel: CancelSignal,
}

impl<S: HistoryStore> OrderFulfillment<S> {
    async fn run(mut self) -> Result<OrderConfirmation, SagaError> {
        let started = std::time::Instant::now();
        let instance = self.journal.instance();

        match instance.state() {
            WorkflowState::Completed => {
                return instance.confirmation().cloned().ok_or_else(|| {
                    SagaError::CorruptHistory("completed workflow has no confirmation".to_string())
                });
            }
            WorkflowState::Failed => {
                return Err(instance.failure().cloned().map(SagaError::WorkflowFailed).unwrap_or_else(
                    || SagaError::CorruptHistory("failed workflow has no failure".to_string()),
                ));
            }
            WorkflowState::Compensating => {
                let primary = instance.primary_failure().cloned().ok_or_else(|| {
                    SagaError::CorruptHistory("compensation started without a failure".to_string())
                })?;
                let failure = WorkflowFailure {
                    primary,
                    compensation_failures: instance.compensation_failures().to_vec(),
                };
                return self.unwind(failure, started).await;
            }
            WorkflowState::Pending | WorkflowState::Running => {}
        }

        let order = instance
            .input()
            .cloned()
            .ok_or_else(|| SagaError::CorruptHistory("workflow has no input".to_string()))?;

        match self.run_steps(&order).await {
            Ok(confirmation) => {
                self.journal
                    .record(WorkflowEvent::workflow_completed(confirmation.clone()))
                    .await?;
                metrics::counter!("workflow_completed").increment(1);
                metrics::histogram!("workflow_duration_seconds").record(started.elapsed().as_secs_f64());
                tracing::info!(
                    confirmation_number = %confirmation.confirmation_number,
                    amount = %confirmation.amount,
                    "workflow completed"
                );
                Ok(confirmation)
            }
            Err(SagaError::Step(failure)) => {
                tracing::warn!(
                    step = %failure.step,
                    reason = %failure.reason(),
                    attempts = failure.attempts,
                    "step failed terminally, compensating"
                );
                let pending = self.journal.instance().pending_compensations().len();
                self.journal
                    .record_all(vec![
                        WorkflowEvent::step_failed(failure.clone()),
                        WorkflowEvent::compensation_started(failure.step.clone(), pending),
                    ])
                    .await?;
                self.unwind(WorkflowFailure::new(failure), started).await
            }
            Err(other) => Err(other),
        }
    }

    async fn run_steps(&mut self, order: &PizzaOrder) -> Result<OrderConfirmation, SagaError> {
        let total = order.total_price()?;

        let distance_service = Arc::clone(&self.services.distance);
        let distance: Distance = self
            .step(STEP_GET_DISTANCE, order.address.clone(), None, move |ctx, address: Address| {
                let service = Arc::clone(&distance_service);
                async move { service.get_distance(&ctx, &address).await }
            })
            .await?;

        self.check_service_area(order, distance).await?;

        let inventory = Arc::clone(&self.services.inventory);
        self.step(
            STEP_UPDATE_INVENTORY,
            order.items.clone(),
            Some(CompensationAction::RevertInventory),
            move |ctx, items: Vec<Pizza>| {
                let service = Arc::clone(&inventory);
                async move { service.update_inventory(&ctx, &items).await }
            },
        )
        .await?;

        self.settle().await?;

        let billing = Arc::clone(&self.services.billing);
        let confirmation: OrderConfirmation = self
            .step(
                STEP_SEND_BILL,
                order.bill(total),
                Some(CompensationAction::RefundCustomer),
                move |ctx, bill: Bill| {
                    let service = Arc::clone(&billing);
                    async move { service.send_bill(&ctx, &bill).await }
                },
            )
            .await?;

        let payment = Arc::clone(&self.services.payment);
        let _charge: ChargeStatus = self
            .step(
                STEP_PROCESS_CREDIT_CARD,
                order.address.clone(),
                None,
                move |ctx, address: Address| {
                    let service = Arc::clone(&payment);
                    async move { service.process_credit_card(&ctx, &address).await }
                },
            )
            .await?;

        Ok(confirmation)
    }

    /// Runs one activity step, or replays its recorded output if it has
    /// already committed. The step's output and its compensation (if any)
    /// are recorded in a single append.
    async fn step<I, O, F, Fut>(
        &mut self,
        name: &'static str,
        input: I,
        compensation: Option<CompensationAction>,
        call: F,
    ) -> Result<O, SagaError>
    where
        I: Serialize + Clone + Send,
        O: Serialize + DeserializeOwned + Send,
        F: FnMut(ActivityContext, I) -> Fut + Send,
        Fut: Future<Output = Result<O, ActivityError>> + Send,
    {
        if let Some(recorded) = self.journal.instance().step_output::<O>(name) {
            tracing::debug!(step = name, "step already committed, replaying recorded output");
            return Ok(recorded?);
        }
        self.ensure_not_cancelled(name)?;

        self.journal.record(WorkflowEvent::step_started(name)).await?;
        tracing::info!(step = name, "workflow step started");

        let options = self.config.activity_options(name);
        let output = self
            .executor
            .execute(name, input.clone(), options, &mut self.journal, call)
            .await?;

        let mut events = vec![WorkflowEvent::step_completed(name, serde_json::to_value(&output)?)];
        if let Some(action) = compensation {
            events.push(WorkflowEvent::compensation_registered(CompensationEntry::new(
                name, action, &input,
            )?));
        }
        self.journal.record_all(events).await?;
        tracing::info!(step = name, "workflow step completed");
        Ok(output)
    }

    async fn check_service_area(&mut self, order: &PizzaOrder, distance: Distance) -> Result<(), SagaError> {
        if self.journal.instance().is_step_completed(STEP_CHECK_SERVICE_AREA) {
            return Ok(());
        }

        let limit = self.config.max_delivery_distance_km;
        if order.is_delivery && distance.kilometers > limit {
            return Err(StepFailure::local(
                STEP_CHECK_SERVICE_AREA,
                reason::OUT_OF_SERVICE_AREA,
                format!(
                    "customer lives outside the service area: {} km exceeds the {limit} km limit",
                    distance.kilometers
                ),
                Some(FailureDetail::Number(distance.kilometers.into())),
            )
            .into());
        }

        self.journal
            .record_all(vec![
                WorkflowEvent::step_started(STEP_CHECK_SERVICE_AREA),
                WorkflowEvent::step_completed(STEP_CHECK_SERVICE_AREA, serde_json::Value::Null),
            ])
            .await
    }

    /// Waits out the settling period. A resumed workflow waits the full
    /// period again.
    async fn settle(&mut self) -> Result<(), SagaError> {
        if self.journal.instance().is_step_completed(STEP_SETTLE) {
            return Ok(());
        }
        self.ensure_not_cancelled(STEP_SETTLE)?;

        self.journal.record(WorkflowEvent::step_started(STEP_SETTLE)).await?;
        let period = self.config.settle_period;
        tracing::debug!(period_ms = period.as_millis() as u64, "waiting for order to settle");

        let cancelled = tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(period) => false,
        };
        if cancelled {
            return Err(cancelled_failure(STEP_SETTLE).into());
        }

        self.journal
            .record(WorkflowEvent::step_completed(STEP_SETTLE, serde_json::Value::Null))
            .await
    }

    /// Runs every pending compensation and records the terminal failure.
    /// Compensations are not cancellable.
    async fn unwind(
        &mut self,
        failure: WorkflowFailure,
        started: std::time::Instant,
    ) -> Result<OrderConfirmation, SagaError> {
        let mut stack = self.journal.instance().pending_compensations();
        let executor = ActivityExecutor::new();
        let failure = stack
            .unwind_all(
                failure,
                &executor,
                &self.config.compensation,
                &self.services,
                &mut self.journal,
            )
            .await?;

        self.journal
            .record(WorkflowEvent::workflow_failed(failure.clone()))
            .await?;
        metrics::counter!("workflow_failed").increment(1);
        metrics::histogram!("workflow_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::warn!(reasons = ?failure.reason_codes(), "workflow failed");
        Err(SagaError::WorkflowFailed(failure))
    }

    fn ensure_not_cancelled(&self, step: &str) -> Result<(), SagaError> {
        if self.cancel.is_cancelled() {
            return Err(cancelled_failure(step).into());
        }
        Ok(())
    }
}

fn cancelled_failure(step: &str) -> StepFailure {
    StepFailure::local(step, reason::CANCELLED, "workflow cancelled", None)
}
