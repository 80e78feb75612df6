//! Durable orchestration of pizza order fulfillment.
//!
//! A workflow runs a fixed sequence of activity steps against external
//! services, recording every decision in a history store so an interrupted
//! instance can be resumed without repeating committed work:
//!
//! 1. Compute the delivery distance
//! 2. Reject delivery orders outside the service area
//! 3. Reserve inventory (compensated by reverting it)
//! 4. Wait for the order to settle
//! 5. Bill the customer (compensated by a refund)
//! 6. Charge the credit card
//!
//! Activities are retried according to a [`RetryPolicy`] driven by how their
//! errors are classified. If a step fails terminally, the compensations
//! registered so far run in reverse order and the workflow fails with every
//! cause preserved.

pub mod aggregate;
pub mod cancellation;
pub mod classifier;
pub mod compensation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod executor;
pub mod heartbeat;
pub mod journal;
pub mod order_fulfillment;
pub mod retry;
pub mod services;
pub mod state;

pub use aggregate::{WorkflowInstance, WorkflowSnapshot};
pub use cancellation::CancelSignal;
pub use classifier::{ActivityError, Classification, ErrorKind, FailureDetail, classify, reason};
pub use compensation::{CompensationAction, CompensationEntry, CompensationRunner, CompensationStack};
pub use config::{DiscountRule, SagaConfig};
pub use coordinator::{WorkflowEngine, WorkflowHandle};
pub use error::{SagaError, StepFailure, WorkflowFailure};
pub use events::WorkflowEvent;
pub use executor::{ActivityContext, ActivityExecutor, ActivityInvocation, ActivityOptions};
pub use heartbeat::{Heartbeat, HeartbeatMonitor};
pub use journal::{ExecutionJournal, HistoryJournal, NoopJournal};
pub use retry::{GiveUpCause, RetryDecision, RetryPolicy};
pub use services::{
    ActivityServices, BillingService, DeliveryService, DistanceService, DriverBehavior, Fault,
    InMemoryBillingService, InMemoryDeliveryService, InMemoryDistanceService,
    InMemoryInventoryService, InMemoryPaymentService, InMemoryServices, InventoryService,
    PaymentService,
};
pub use state::WorkflowState;
