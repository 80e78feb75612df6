//! Billing service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use domain::{Bill, Money, OrderConfirmation};

use super::fault::{ActivityLog, Fault, FaultPlan};
use crate::classifier::{ActivityError, FailureDetail, reason};
use crate::config::DiscountRule;
use crate::executor::ActivityContext;
use crate::order_fulfillment::{ACTIVITY_REFUND_CUSTOMER, STEP_SEND_BILL};

/// Confirmation number issued by the billing system.
pub const CONFIRMATION_NUMBER: &str = "AB9923";

/// Trait for billing operations.
#[async_trait]
pub trait BillingService: Send + Sync {
    /// Bills a customer, applying any discount.
    async fn send_bill(
        &self,
        ctx: &ActivityContext,
        bill: &Bill,
    ) -> Result<OrderConfirmation, ActivityError>;

    /// Refunds a bill that was sent.
    async fn refund_customer(&self, ctx: &ActivityContext, bill: &Bill) -> Result<(), ActivityError>;

    /// The discount rule this service applies, if it is known locally.
    fn discount_rule(&self) -> Option<DiscountRule> {
        None
    }
}

#[derive(Debug, Default)]
struct InMemoryBillingState {
    /// Charged amount per order number.
    charges: HashMap<String, Money>,
    refunds: Vec<(String, Money)>,
    send_calls: usize,
    refund_calls: usize,
    faults: FaultPlan,
}

/// In-memory billing service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingService {
    state: Arc<RwLock<InMemoryBillingState>>,
    discount: DiscountRule,
    log: ActivityLog,
}

impl InMemoryBillingService {
    /// Creates a billing service with the given discount rule.
    pub fn new(discount: DiscountRule) -> Self {
        Self {
            discount,
            ..Self::default()
        }
    }

    /// Records invocations in a shared log.
    pub fn with_log(mut self, log: ActivityLog) -> Self {
        self.log = log;
        self
    }

    /// Injects a fault into `send_bill` or `refund_customer`.
    pub fn set_fault(&self, operation: &str, fault: Fault) {
        self.state().faults.set(operation, fault);
    }

    /// Returns the amount charged for an order, if it is still billed.
    pub fn charged(&self, order_number: &str) -> Option<Money> {
        self.state().charges.get(order_number).copied()
    }

    /// Returns the number of outstanding (not refunded) bills.
    pub fn bill_count(&self) -> usize {
        self.state().charges.len()
    }

    /// Returns every refund issued, oldest first.
    pub fn refunds(&self) -> Vec<(String, Money)> {
        self.state().refunds.clone()
    }

    /// Returns the number of `send_bill` calls.
    pub fn send_calls(&self) -> usize {
        self.state().send_calls
    }

    /// Returns the number of `refund_customer` calls.
    pub fn refund_calls(&self) -> usize {
        self.state().refund_calls
    }

    fn state(&self) -> RwLockWriteGuard<'_, InMemoryBillingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BillingService for InMemoryBillingService {
    fn discount_rule(&self) -> Option<DiscountRule> {
        Some(self.discount)
    }

    async fn send_bill(
        &self,
        _ctx: &ActivityContext,
        bill: &Bill,
    ) -> Result<OrderConfirmation, ActivityError> {
        self.log.record(STEP_SEND_BILL);
        let injected = {
            let mut state = self.state();
            state.send_calls += 1;
            state.faults.next(STEP_SEND_BILL)
        };
        if let Some(injected) = injected {
            injected.resolve().await?;
        }

        let amount = self.discount.apply(bill.amount);
        if amount != bill.amount {
            tracing::info!(original = %bill.amount, charged = %amount, "applied discount");
        }
        if amount.is_negative() {
            return Err(ActivityError::non_retryable(
                reason::INVALID_CHARGE_AMOUNT,
                format!("invalid charge amount: {amount} (must be above zero)"),
            )
            .with_detail(FailureDetail::Number(amount.cents())));
        }

        self.state().charges.insert(bill.order_number.clone(), amount);
        Ok(OrderConfirmation {
            order_number: bill.order_number.clone(),
            status: "SUCCESS".to_string(),
            confirmation_number: CONFIRMATION_NUMBER.to_string(),
            billing_timestamp: chrono::Utc::now().timestamp(),
            amount,
        })
    }

    async fn refund_customer(&self, _ctx: &ActivityContext, bill: &Bill) -> Result<(), ActivityError> {
        self.log.record(ACTIVITY_REFUND_CUSTOMER);
        let injected = {
            let mut state = self.state();
            state.refund_calls += 1;
            state.faults.next(ACTIVITY_REFUND_CUSTOMER)
        };
        if let Some(injected) = injected {
            injected.resolve().await?;
        }

        let mut state = self.state();
        let amount = state
            .charges
            .remove(&bill.order_number)
            .unwrap_or(bill.amount);
        state.refunds.push((bill.order_number.clone(), amount));
        tracing::debug!(order_number = %bill.order_number, %amount, "customer refunded");
        Ok(())
    }
}
