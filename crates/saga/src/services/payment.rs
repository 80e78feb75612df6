//! Payment service trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use domain::{Address, ChargeStatus};

use super::fault::{ActivityLog, Fault, FaultPlan};
use crate::classifier::{ActivityError, reason};
use crate::executor::ActivityContext;
use crate::order_fulfillment::STEP_PROCESS_CREDIT_CARD;

/// Number of digits in a valid card number.
pub const CARD_NUMBER_LENGTH: usize = 16;

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges the card carried on the address.
    async fn process_credit_card(
        &self,
        ctx: &ActivityContext,
        address: &Address,
    ) -> Result<ChargeStatus, ActivityError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: usize,
    calls: usize,
    faults: FaultPlan,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
    log: ActivityLog,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records invocations in a shared log.
    pub fn with_log(mut self, log: ActivityLog) -> Self {
        self.log = log;
        self
    }

    /// Injects a fault into `process_credit_card`.
    pub fn set_fault(&self, fault: Fault) {
        self.state().faults.set(STEP_PROCESS_CREDIT_CARD, fault);
    }

    /// Returns the number of successful charges.
    pub fn charge_count(&self) -> usize {
        self.state().charges
    }

    /// Returns the number of `process_credit_card` calls.
    pub fn call_count(&self) -> usize {
        self.state().calls
    }

    fn state(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn process_credit_card(
        &self,
        _ctx: &ActivityContext,
        address: &Address,
    ) -> Result<ChargeStatus, ActivityError> {
        self.log.record(STEP_PROCESS_CREDIT_CARD);
        let injected = {
            let mut state = self.state();
            state.calls += 1;
            state.faults.next(STEP_PROCESS_CREDIT_CARD)
        };
        if let Some(injected) = injected {
            injected.resolve().await?;
        }

        if address.card_number.chars().count() != CARD_NUMBER_LENGTH {
            return Err(ActivityError::non_retryable(
                reason::CREDIT_CARD_INVALID,
                format!("credit card number must contain {CARD_NUMBER_LENGTH} digits"),
            ));
        }

        self.state().charges += 1;
        Ok(ChargeStatus { success: true })
    }
}
