//! Integration tests for the order fulfillment workflow.

use std::time::Duration;

use common::WorkflowId;
use domain::{
    Address, Customer, CustomerId, Money, OrderConfirmation, OrderError, Pizza, PizzaOrder,
};
use history::InMemoryHistoryStore;
use saga::order_fulfillment::{
    STEP_CHECK_SERVICE_AREA, STEP_GET_DISTANCE, STEP_SEND_BILL, STEP_UPDATE_INVENTORY, STEPS,
};
use saga::{
    ActivityError, ActivityExecutor, ActivityOptions, CompensationAction, CompensationEntry,
    DeliveryService, DiscountRule, DriverBehavior, ErrorKind, FailureDetail, Fault, GiveUpCause,
    HistoryJournal, InMemoryDeliveryService, InMemoryServices, NoopJournal, RetryPolicy,
    SagaConfig, SagaError, WorkflowEngine, WorkflowEvent, WorkflowFailure, WorkflowState, reason,
};

struct TestHarness {
    engine: WorkflowEngine<InMemoryHistoryStore>,
    services: InMemoryServices,
    store: InMemoryHistoryStore,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(SagaConfig::default())
    }

    fn with_config(config: SagaConfig) -> Self {
        let store = InMemoryHistoryStore::new();
        let services = InMemoryServices::new(config.discount);
        let engine =
            WorkflowEngine::new(store.clone(), services.activity_services(), config).unwrap();
        Self {
            engine,
            services,
            store,
        }
    }

    async fn run(&self, order: PizzaOrder) -> Result<OrderConfirmation, SagaError> {
        let id = WorkflowId::for_order(&order.order_number);
        self.engine.start(id, order).await.unwrap().outcome().await
    }
}

fn order(order_number: &str) -> PizzaOrder {
    PizzaOrder {
        order_number: order_number.to_string(),
        customer: Customer {
            customer_id: CustomerId::new(12983),
            name: "María García".to_string(),
            email: "maria1985@example.com".to_string(),
            phone: "415-555-7418".to_string(),
        },
        items: vec![
            Pizza::new("Large, with mushrooms and onions", Money::from_cents(1500)),
            Pizza::new("Small, with pepperoni", Money::from_cents(1200)),
            Pizza::new("Medium, with extra cheese", Money::from_cents(1300)),
        ],
        is_delivery: true,
        address: Address {
            line1: "1 Main St".to_string(),
            line2: String::new(),
            city: "San Francisco".to_string(),
            state: "CA".to_string(),
            postal_code: "94103".to_string(),
            card_number: "1234567890123456".to_string(),
        },
    }
}

fn far_order(order_number: &str) -> PizzaOrder {
    let mut order = order(order_number);
    order.address.line1 = "123 Elm Drive".to_string();
    order.address.line2 = "Apartment 9C".to_string();
    order
}

fn expect_failure(result: Result<OrderConfirmation, SagaError>) -> WorkflowFailure {
    match result {
        Err(SagaError::WorkflowFailed(failure)) => failure,
        other => panic!("expected WorkflowFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_successful_fulfillment() {
    let harness = TestHarness::new();

    let confirmation = harness.run(order("Z1238")).await.unwrap();

    assert_eq!(confirmation.order_number, "Z1238");
    assert_eq!(confirmation.status, "SUCCESS");
    assert_eq!(confirmation.confirmation_number, "AB9923");
    // $40.00 is above the $30.00 threshold
    assert_eq!(confirmation.amount, Money::from_cents(3500));

    let snapshot = harness
        .engine
        .describe(&WorkflowId::for_order("Z1238"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.state, WorkflowState::Completed);
    assert_eq!(snapshot.workflow_type, "PizzaOrderFulfillment");
    assert_eq!(snapshot.completed_steps, STEPS);
    assert_eq!(snapshot.confirmation.as_ref(), Some(&confirmation));
    assert!(snapshot.failure.is_none());

    assert_eq!(harness.services.inventory.reserved_count(), 3);
    assert_eq!(
        harness.services.billing.charged("Z1238"),
        Some(Money::from_cents(3500))
    );
    assert_eq!(harness.services.payment.charge_count(), 1);
    assert_eq!(
        harness.services.log.entries(),
        [
            "get_distance",
            "update_inventory",
            "send_bill",
            "process_credit_card"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_small_order_is_not_discounted() {
    let harness = TestHarness::new();
    let mut small = order("S1");
    small.items.truncate(1);

    let confirmation = harness.run(small).await.unwrap();
    assert_eq!(confirmation.amount, Money::from_cents(1500));
}

#[tokio::test(start_paused = true)]
async fn test_out_of_service_area_fails_without_side_effects() {
    let harness = TestHarness::new();

    let failure = expect_failure(harness.run(far_order("Z9")).await);

    assert_eq!(failure.reason(), reason::OUT_OF_SERVICE_AREA);
    assert_eq!(failure.primary.step, STEP_CHECK_SERVICE_AREA);
    assert_eq!(failure.primary.kind(), ErrorKind::Fatal);
    assert_eq!(failure.primary.attempts, 0);
    assert_eq!(
        failure.primary.classification.detail,
        Some(FailureDetail::Number(15))
    );
    assert!(failure.fully_compensated());

    assert_eq!(harness.services.inventory.update_calls(), 0);
    assert_eq!(harness.services.billing.send_calls(), 0);
    assert_eq!(harness.services.log.entries(), ["get_distance"]);

    let snapshot = harness
        .engine
        .describe(&WorkflowId::for_order("Z9"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.state, WorkflowState::Failed);
    assert_eq!(snapshot.completed_steps, [STEP_GET_DISTANCE]);
    assert!(snapshot.compensation_stack.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pickup_order_ignores_distance() {
    let harness = TestHarness::new();
    let mut pickup = far_order("P1");
    pickup.address.line1 = "701 Mission Street".to_string();
    pickup.is_delivery = false;

    harness.run(pickup).await.unwrap();
    assert_eq!(harness.services.inventory.reserved_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_card_compensates_in_reverse_order() {
    let harness = TestHarness::new();
    let mut input = order("Z2");
    input.address.card_number = "1234".to_string();

    let failure = expect_failure(harness.run(input).await);

    assert_eq!(failure.reason(), reason::CREDIT_CARD_INVALID);
    assert_eq!(failure.primary.kind(), ErrorKind::NonRetryable);
    assert_eq!(failure.primary.cause, GiveUpCause::NonRetryable);
    assert_eq!(failure.primary.attempts, 1);
    assert!(failure.fully_compensated());

    assert_eq!(
        harness.services.log.entries(),
        [
            "get_distance",
            "update_inventory",
            "send_bill",
            "process_credit_card",
            "refund_customer",
            "revert_inventory",
        ]
    );
    assert_eq!(harness.services.inventory.reserved_count(), 0);
    assert_eq!(harness.services.billing.bill_count(), 0);
    assert_eq!(
        harness.services.billing.refunds(),
        [("Z2".to_string(), Money::from_cents(3500))]
    );

    let snapshot = harness
        .engine
        .describe(&WorkflowId::for_order("Z2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.state, WorkflowState::Failed);
    assert!(snapshot.compensation_stack.is_empty());
    assert_eq!(snapshot.resolved_compensations, ["send_bill", "update_inventory"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_compensation_is_reported_alongside_primary() {
    let harness = TestHarness::new();
    harness.services.billing.set_fault(
        "refund_customer",
        Fault::Always(ActivityError::Transport("billing unreachable".to_string())),
    );
    let mut input = order("Z3");
    input.address.card_number = "0000".to_string();

    let failure = expect_failure(harness.run(input).await);

    assert_eq!(
        failure.reason_codes(),
        [reason::CREDIT_CARD_INVALID, reason::TRANSPORT_ERROR]
    );
    assert!(!failure.fully_compensated());
    assert_eq!(failure.compensation_failures[0].step, "refund_customer");
    assert_eq!(failure.compensation_failures[0].attempts, 3);

    // inventory is still reverted after the refund gave up
    assert_eq!(harness.services.billing.refund_calls(), 3);
    assert_eq!(harness.services.inventory.revert_calls(), 1);
    assert_eq!(harness.services.inventory.reserved_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let harness = TestHarness::new();
    harness
        .services
        .inventory
        .set_fault(STEP_UPDATE_INVENTORY, Fault::transient(2));

    harness.run(order("Z4")).await.unwrap();

    assert_eq!(harness.services.inventory.update_calls(), 3);
    assert_eq!(harness.services.inventory.reserved_count(), 3);
    let snapshot = harness
        .engine
        .describe(&WorkflowId::for_order("Z4"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.attempts.get(STEP_UPDATE_INVENTORY), Some(&3));
    assert_eq!(snapshot.attempts.get(STEP_SEND_BILL), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn test_attempts_are_bounded_by_policy() {
    let config = SagaConfig::default().with_step_options(
        STEP_GET_DISTANCE,
        ActivityOptions::default()
            .with_retry_policy(RetryPolicy::default().with_maximum_attempts(4)),
    );
    let harness = TestHarness::with_config(config);
    harness.services.distance.set_fault(Fault::Always(ActivityError::Transport(
        "maps api down".to_string(),
    )));

    let failure = expect_failure(harness.run(order("Z5")).await);

    assert_eq!(failure.reason(), reason::TRANSPORT_ERROR);
    assert_eq!(failure.primary.attempts, 4);
    assert_eq!(failure.primary.cause, GiveUpCause::AttemptsExhausted);
    assert_eq!(harness.services.distance.call_count(), 4);
    assert_eq!(harness.services.inventory.update_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_is_not_retried() {
    let harness = TestHarness::new();
    harness.services.billing.set_fault(
        STEP_SEND_BILL,
        Fault::Always(ActivityError::non_retryable(
            reason::INVALID_CHARGE_AMOUNT,
            "invalid charge amount",
        )),
    );

    let failure = expect_failure(harness.run(order("Z6")).await);

    assert_eq!(failure.reason(), reason::INVALID_CHARGE_AMOUNT);
    assert_eq!(harness.services.billing.send_calls(), 1);
    // the bill never went out, so only inventory is compensated
    assert_eq!(harness.services.billing.refund_calls(), 0);
    assert_eq!(harness.services.inventory.revert_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_activity_times_out() {
    let config = SagaConfig::default().with_step_options(
        STEP_SEND_BILL,
        ActivityOptions::default()
            .with_start_to_close_timeout(Duration::from_secs(2))
            .with_heartbeat_timeout(None)
            .with_retry_policy(RetryPolicy::default().with_maximum_attempts(2)),
    );
    let harness = TestHarness::with_config(config);
    harness.services.billing.set_fault(STEP_SEND_BILL, Fault::Stall);

    let failure = expect_failure(harness.run(order("Z7")).await);

    assert_eq!(failure.reason(), reason::START_TO_CLOSE_TIMEOUT);
    assert_eq!(failure.primary.kind(), ErrorKind::Retryable);
    assert_eq!(harness.services.billing.send_calls(), 2);
    assert_eq!(harness.services.inventory.reserved_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_skips_committed_steps() {
    let harness = TestHarness::new();
    let input = order("Z8");
    let id = WorkflowId::for_order("Z8");

    // history left behind by a worker that died after reserving inventory
    let mut journal = HistoryJournal::create(harness.store.clone(), id.clone(), input.clone())
        .await
        .unwrap();
    journal
        .record_all(vec![
            WorkflowEvent::step_started(STEP_GET_DISTANCE),
            WorkflowEvent::attempt_started(STEP_GET_DISTANCE, 1, 0),
            WorkflowEvent::step_completed(STEP_GET_DISTANCE, serde_json::json!({"kilometers": 5})),
            WorkflowEvent::step_started(STEP_CHECK_SERVICE_AREA),
            WorkflowEvent::step_completed(STEP_CHECK_SERVICE_AREA, serde_json::Value::Null),
            WorkflowEvent::step_started(STEP_UPDATE_INVENTORY),
            WorkflowEvent::attempt_started(STEP_UPDATE_INVENTORY, 1, 0),
            WorkflowEvent::step_completed(STEP_UPDATE_INVENTORY, serde_json::Value::Null),
            WorkflowEvent::compensation_registered(
                CompensationEntry::new(
                    STEP_UPDATE_INVENTORY,
                    CompensationAction::RevertInventory,
                    &input.items,
                )
                .unwrap(),
            ),
        ])
        .await
        .unwrap();

    let confirmation = harness.engine.resume(id.clone()).await.unwrap().outcome().await.unwrap();

    assert_eq!(confirmation.amount, Money::from_cents(3500));
    assert_eq!(harness.services.distance.call_count(), 0);
    assert_eq!(harness.services.inventory.update_calls(), 0);
    assert_eq!(harness.services.billing.send_calls(), 1);

    let snapshot = harness.engine.describe(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.completed_steps, STEPS);
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_crash() {
    let harness = TestHarness::new();
    let id = WorkflowId::for_order("Z10");

    let handle = harness.engine.start(id.clone(), order("Z10")).await.unwrap();
    // inventory is reserved and the workflow is settling
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.abort();
    assert!(matches!(handle.outcome().await, Err(SagaError::TaskAborted(_))));

    let snapshot = harness.engine.describe(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, WorkflowState::Running);
    assert_eq!(snapshot.current_step.as_deref(), Some("settle"));

    harness.engine.resume(id).await.unwrap().outcome().await.unwrap();
    assert_eq!(harness.services.inventory.update_calls(), 1);
    assert_eq!(harness.services.inventory.reserved_count(), 3);
    assert_eq!(harness.services.billing.send_calls(), 1);
}

fn stalled_billing_harness() -> TestHarness {
    let config = SagaConfig {
        settle_period: Duration::ZERO,
        ..SagaConfig::default()
    }
    .with_step_options(
        STEP_SEND_BILL,
        ActivityOptions::default()
            .with_start_to_close_timeout(Duration::from_secs(2))
            .with_heartbeat_timeout(None)
            .with_retry_policy(RetryPolicy::default().with_maximum_attempts(3)),
    );
    let harness = TestHarness::with_config(config);
    harness.services.billing.set_fault(STEP_SEND_BILL, Fault::Stall);
    harness
}

#[tokio::test(start_paused = true)]
async fn test_resume_keeps_attempt_budget() {
    // attempts run at 0-2s, 3-5s and 7-9s
    let harness = stalled_billing_harness();
    let id = WorkflowId::for_order("Z15");

    let handle = harness.engine.start(id.clone(), order("Z15")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    handle.abort();
    let _ = handle.outcome().await;

    let snapshot = harness.engine.describe(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.attempts.get(STEP_SEND_BILL), Some(&2));
    assert_eq!(harness.services.billing.send_calls(), 2);

    let failure = expect_failure(harness.engine.resume(id.clone()).await.unwrap().outcome().await);

    assert_eq!(failure.reason(), reason::START_TO_CLOSE_TIMEOUT);
    assert_eq!(failure.primary.attempts, 3);
    assert_eq!(harness.services.billing.send_calls(), 3);
    assert_eq!(harness.services.inventory.revert_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_final_attempt_gives_up() {
    let harness = stalled_billing_harness();
    let id = WorkflowId::for_order("Z16");

    let handle = harness.engine.start(id.clone(), order("Z16")).await.unwrap();
    // the third and last attempt is in flight
    tokio::time::sleep(Duration::from_secs(8)).await;
    handle.abort();
    let _ = handle.outcome().await;
    assert_eq!(harness.services.billing.send_calls(), 3);

    let failure = expect_failure(harness.engine.resume(id.clone()).await.unwrap().outcome().await);

    assert_eq!(failure.primary.attempts, 3);
    assert_eq!(failure.primary.cause, GiveUpCause::AttemptsExhausted);
    assert_eq!(harness.services.billing.send_calls(), 3);
    assert_eq!(harness.services.inventory.revert_calls(), 1);

    let snapshot = harness.engine.describe(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, WorkflowState::Failed);
    assert_eq!(snapshot.attempts.get(STEP_SEND_BILL), Some(&3));
}

#[tokio::test(start_paused = true)]
async fn test_resume_interrupted_compensation() {
    let harness = TestHarness::new();
    let input = order("Z11");
    let id = WorkflowId::for_order("Z11");
    let primary = saga::StepFailure::local(
        STEP_SEND_BILL,
        reason::CANCELLED,
        "workflow cancelled",
        None,
    );

    let mut journal = HistoryJournal::create(harness.store.clone(), id.clone(), input.clone())
        .await
        .unwrap();
    journal
        .record_all(vec![
            WorkflowEvent::step_started(STEP_UPDATE_INVENTORY),
            WorkflowEvent::step_completed(STEP_UPDATE_INVENTORY, serde_json::Value::Null),
            WorkflowEvent::compensation_registered(
                CompensationEntry::new(
                    STEP_UPDATE_INVENTORY,
                    CompensationAction::RevertInventory,
                    &input.items,
                )
                .unwrap(),
            ),
            WorkflowEvent::step_failed(primary),
            WorkflowEvent::compensation_started(STEP_SEND_BILL, 1),
        ])
        .await
        .unwrap();

    let failure = expect_failure(harness.engine.resume(id.clone()).await.unwrap().outcome().await);

    assert_eq!(failure.reason(), reason::CANCELLED);
    assert_eq!(harness.services.inventory.revert_calls(), 1);
    assert_eq!(harness.services.billing.send_calls(), 0);

    // a terminal workflow resolves to its recorded outcome
    let again = expect_failure(harness.engine.resume(id).await.unwrap().outcome().await);
    assert_eq!(again, failure);
    assert_eq!(harness.services.inventory.revert_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_completed_workflow() {
    let harness = TestHarness::new();
    let first = harness.run(order("Z12")).await.unwrap();

    let replayed = harness
        .engine
        .resume(WorkflowId::for_order("Z12"))
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert_eq!(replayed, first);
    assert_eq!(harness.services.billing.send_calls(), 1);
    assert_eq!(harness.services.payment.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_settling() {
    let harness = TestHarness::new();
    let id = WorkflowId::for_order("Z13");

    let handle = harness.engine.start(id.clone(), order("Z13")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.cancel();

    let failure = expect_failure(handle.outcome().await);

    assert_eq!(failure.reason(), reason::CANCELLED);
    assert_eq!(failure.primary.step, "settle");
    assert_eq!(harness.services.billing.send_calls(), 0);
    assert_eq!(harness.services.inventory.revert_calls(), 1);
    assert_eq!(harness.services.inventory.reserved_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_instances_are_isolated() {
    let harness = TestHarness::new();

    let mut handles = Vec::new();
    for n in 0..5 {
        let mut input = order(&format!("C{n}"));
        if n == 2 {
            input.address.card_number = "bad".to_string();
        }
        let id = WorkflowId::for_order(&input.order_number);
        handles.push(harness.engine.start(id, input).await.unwrap());
    }

    let mut completed = 0;
    for handle in handles {
        let id = handle.workflow_id().clone();
        match handle.outcome().await {
            Ok(_) => completed += 1,
            Err(SagaError::WorkflowFailed(failure)) => {
                assert_eq!(id, WorkflowId::for_order("C2"));
                assert_eq!(failure.reason(), reason::CREDIT_CARD_INVALID);
            }
            Err(e) => panic!("unexpected error for {id}: {e}"),
        }
    }

    assert_eq!(completed, 4);
    assert_eq!(harness.services.inventory.reserved_count(), 12);
    assert_eq!(harness.services.billing.bill_count(), 4);
    assert_eq!(harness.services.billing.charged("C2"), None);

    let mut ids = harness.engine.list().await.unwrap();
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(ids.len(), 5);
    assert_eq!(ids[0], WorkflowId::for_order("C0"));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_and_invalid_starts() {
    let harness = TestHarness::new();
    let id = WorkflowId::for_order("D1");
    harness.engine.start(id.clone(), order("D1")).await.unwrap();

    let duplicate = harness.engine.start(id.clone(), order("D1")).await;
    assert!(matches!(duplicate, Err(SagaError::AlreadyStarted(existing)) if existing == id));

    let mut invalid = order("D2");
    invalid.items[1].price = Money::from_cents(-100);
    let result = harness
        .engine
        .start(WorkflowId::for_order("D2"), invalid)
        .await;
    assert!(matches!(result, Err(SagaError::InvalidInput(_))));
    assert!(harness
        .engine
        .describe(&WorkflowId::for_order("D2"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_order_total_overflow_is_rejected_at_start() {
    let harness = TestHarness::new();
    let id = WorkflowId::for_order("O1");
    let mut huge = order("O1");
    huge.items = vec![
        Pizza::new("Large", Money::from_cents(i64::MAX)),
        Pizza::new("Small", Money::from_cents(1)),
    ];

    let result = harness.engine.start(id.clone(), huge).await;

    assert!(matches!(
        result,
        Err(SagaError::InvalidInput(OrderError::TotalOverflow))
    ));
    assert!(harness.engine.describe(&id).await.unwrap().is_none());
    assert_eq!(harness.services.distance.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_describe_running_workflow() {
    let harness = TestHarness::new();
    let id = WorkflowId::for_order("R1");

    let handle = harness.engine.start(id.clone(), order("R1")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = harness.engine.describe(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.workflow_id, Some(id));
    assert_eq!(snapshot.state, WorkflowState::Running);
    assert_eq!(snapshot.current_step.as_deref(), Some("settle"));
    assert_eq!(snapshot.compensation_stack.len(), 1);
    assert_eq!(
        snapshot.compensation_stack[0].action,
        CompensationAction::RevertInventory
    );

    handle.outcome().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_driver_heartbeats_keep_activity_alive() {
    let driver = InMemoryDeliveryService::new(DriverBehavior {
        responds_after_polls: Some(6),
        ..DriverBehavior::default()
    });
    let options = ActivityOptions::default()
        .with_start_to_close_timeout(Duration::from_secs(30))
        .with_heartbeat_timeout(Some(Duration::from_secs(2)));

    ActivityExecutor::new()
        .execute(
            "notify_delivery_driver",
            "Z1238".to_string(),
            &options,
            &mut NoopJournal,
            |ctx, order_number: String| {
                let driver = driver.clone();
                async move { driver.notify_delivery_driver(&ctx, &order_number).await }
            },
        )
        .await
        .unwrap();

    assert_eq!(driver.notified(), ["Z1238"]);
    assert_eq!(driver.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_driver_misses_heartbeat() {
    let driver = InMemoryDeliveryService::new(DriverBehavior {
        responds_after_polls: None,
        heartbeats: false,
        ..DriverBehavior::default()
    });
    let options = ActivityOptions::default()
        .with_start_to_close_timeout(Duration::from_secs(30))
        .with_heartbeat_timeout(Some(Duration::from_secs(2)))
        .with_retry_policy(RetryPolicy::default().with_maximum_attempts(2));

    let err = ActivityExecutor::new()
        .execute(
            "notify_delivery_driver",
            "Z1238".to_string(),
            &options,
            &mut NoopJournal,
            |ctx, order_number: String| {
                let driver = driver.clone();
                async move { driver.notify_delivery_driver(&ctx, &order_number).await }
            },
        )
        .await
        .unwrap_err();

    let SagaError::Step(failure) = err else {
        panic!("expected a step failure, got {err:?}");
    };
    assert_eq!(failure.reason(), reason::HEARTBEAT_TIMEOUT);
    assert_eq!(failure.kind(), ErrorKind::Retryable);
    assert_eq!(failure.attempts, 2);
    assert_eq!(driver.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_driver() {
    let driver = InMemoryDeliveryService::new(DriverBehavior {
        responds_after_polls: None,
        ..DriverBehavior::default()
    });
    let options = ActivityOptions::default()
        .with_start_to_close_timeout(Duration::from_secs(30))
        .with_retry_policy(RetryPolicy::no_retry());

    let err = ActivityExecutor::new()
        .execute(
            "notify_delivery_driver",
            "Z1238".to_string(),
            &options,
            &mut NoopJournal,
            |ctx, order_number: String| {
                let driver = driver.clone();
                async move { driver.notify_delivery_driver(&ctx, &order_number).await }
            },
        )
        .await
        .unwrap_err();

    let SagaError::Step(failure) = err else {
        panic!("expected a step failure, got {err:?}");
    };
    assert_eq!(failure.reason(), reason::DRIVER_UNRESPONSIVE);
    assert_eq!(failure.attempts, 1);
    assert!(driver.notified().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_configured_discount_reaches_billing() {
    let harness = TestHarness::with_config(SagaConfig {
        discount: DiscountRule {
            threshold: Money::from_cents(1000),
            discount: Money::from_cents(100),
        },
        ..SagaConfig::default()
    });

    let confirmation = harness.run(order("Z14")).await.unwrap();
    assert_eq!(confirmation.amount, Money::from_cents(3900));
}
