use std::time::Duration;

use common::WorkflowId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Address, Aggregate, Customer, CustomerId, Money, Pizza, PizzaOrder};
use history::InMemoryHistoryStore;
use saga::{
    Classification, CompensationAction, CompensationEntry, ErrorKind, InMemoryServices,
    RetryPolicy, SagaConfig, WorkflowEngine, WorkflowEvent, WorkflowInstance, reason,
};

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
        ],
        is_delivery: true,
        address: Address {
            line1: "1 Main St".to_string(),
            card_number: "1234567890123456".to_string(),
            ..Address::default()
        },
    }
}

fn bench_retry_evaluate(c: &mut Criterion) {
    let policy = RetryPolicy::default().with_maximum_attempts(10);
    let transient = Classification::new(ErrorKind::Retryable, reason::TRANSPORT_ERROR);

    c.bench_function("saga/retry_evaluate", |b| {
        b.iter(|| {
            for attempt in 1..=10 {
                std::hint::black_box(policy.evaluate(&transient, attempt));
            }
        });
    });
}

fn bench_instance_replay(c: &mut Criterion) {
    let input = order("B1");
    let mut events = vec![WorkflowEvent::workflow_started(
        WorkflowId::for_order("B1"),
        saga::order_fulfillment::WORKFLOW_TYPE,
        input.clone(),
    )];
    for step in saga::order_fulfillment::STEPS {
        events.push(WorkflowEvent::step_started(step));
        events.push(WorkflowEvent::attempt_started(step, 1, 0));
        events.push(WorkflowEvent::step_completed(step, serde_json::Value::Null));
    }
    events.push(WorkflowEvent::compensation_registered(
        CompensationEntry::new("update_inventory", CompensationAction::RevertInventory, &input.items)
            .unwrap(),
    ));
    let payloads: Vec<serde_json::Value> = events
        .iter()
        .map(|e| serde_json::to_value(e).unwrap())
        .collect();

    c.bench_function("saga/instance_replay", |b| {
        b.iter(|| {
            let mut instance = WorkflowInstance::default();
            for payload in &payloads {
                instance.apply(serde_json::from_value(payload.clone()).unwrap());
            }
            std::hint::black_box(instance.snapshot());
        });
    });
}

fn bench_full_workflow(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let config = SagaConfig {
        settle_period: Duration::ZERO,
        ..SagaConfig::default()
    };
    let mut n = 0u64;

    c.bench_function("saga/full_workflow", |b| {
        b.iter(|| {
            n += 1;
            rt.block_on(async {
                let services = InMemoryServices::new(config.discount);
                let engine = WorkflowEngine::new(
                    InMemoryHistoryStore::new(),
                    services.activity_services(),
                    config.clone(),
                )
                .unwrap();
                let input = order(&format!("B{n}"));
                let id = WorkflowId::for_order(&input.order_number);
                engine.start(id, input).await.unwrap().outcome().await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_retry_evaluate,
    bench_instance_replay,
    bench_full_workflow
);
criterion_main!(benches);
