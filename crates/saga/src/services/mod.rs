//! External service traits and in-memory implementations for workflow
//! activities.

pub mod billing;
pub mod delivery;
pub mod distance;
pub mod fault;
pub mod inventory;
pub mod payment;

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Bill, Pizza};

use crate::classifier::ActivityError;
use crate::compensation::{CompensationAction, CompensationEntry, CompensationRunner};
use crate::config::DiscountRule;
use crate::executor::ActivityContext;

pub use billing::{BillingService, InMemoryBillingService};
pub use delivery::{DeliveryService, DriverBehavior, InMemoryDeliveryService};
pub use distance::{DistanceService, InMemoryDistanceService, estimate_distance};
pub use fault::{ActivityLog, Fault};
pub use inventory::{InMemoryInventoryService, InventoryService};
pub use payment::{InMemoryPaymentService, PaymentService};

/// The services the fulfillment workflow calls.
#[derive(Clone)]
pub struct ActivityServices {
    pub distance: Arc<dyn DistanceService>,
    pub inventory: Arc<dyn InventoryService>,
    pub billing: Arc<dyn BillingService>,
    pub payment: Arc<dyn PaymentService>,
}

impl ActivityServices {
    pub fn new(
        distance: impl DistanceService + 'static,
        inventory: impl InventoryService + 'static,
        billing: impl BillingService + 'static,
        payment: impl PaymentService + 'static,
    ) -> Self {
        Self {
            distance: Arc::new(distance),
            inventory: Arc::new(inventory),
            billing: Arc::new(billing),
            payment: Arc::new(payment),
        }
    }
}

#[async_trait]
impl CompensationRunner for ActivityServices {
    async fn run(&self, ctx: ActivityContext, entry: CompensationEntry) -> Result<(), ActivityError> {
        match entry.action {
            CompensationAction::RevertInventory => {
                let items: Vec<Pizza> = entry.input()?;
                self.inventory.revert_inventory(&ctx, &items).await
            }
            CompensationAction::RefundCustomer => {
                let bill: Bill = entry.input()?;
                self.billing.refund_customer(&ctx, &bill).await
            }
        }
    }
}

/// A full set of in-memory services sharing one activity log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServices {
    pub distance: InMemoryDistanceService,
    pub inventory: InMemoryInventoryService,
    pub billing: InMemoryBillingService,
    pub payment: InMemoryPaymentService,
    pub delivery: InMemoryDeliveryService,
    pub log: ActivityLog,
}

impl InMemoryServices {
    /// Creates services that bill with the given discount rule.
    pub fn new(discount: DiscountRule) -> Self {
        let log = ActivityLog::new();
        Self {
            distance: InMemoryDistanceService::new().with_log(log.clone()),
            inventory: InMemoryInventoryService::new().with_log(log.clone()),
            billing: InMemoryBillingService::new(discount).with_log(log.clone()),
            payment: InMemoryPaymentService::new().with_log(log.clone()),
            delivery: InMemoryDeliveryService::new(DriverBehavior::default()).with_log(log.clone()),
            log,
        }
    }

    /// Returns the workflow-facing handles. Clones share state with `self`.
    pub fn activity_services(&self) -> ActivityServices {
        ActivityServices::new(
            self.distance.clone(),
            self.inventory.clone(),
            self.billing.clone(),
            self.payment.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CustomerId, Money};

    #[tokio::test]
    async fn test_runner_dispatches_by_action() {
        let services = InMemoryServices::new(DiscountRule::default());
        let runner = services.activity_services();
        let ctx = ActivityContext::detached("compensation");

        let items = vec![Pizza::new("Large", Money::from_cents(1500))];
        let bill = Bill {
            customer_id: CustomerId::new(1),
            order_number: "A1".to_string(),
            description: "Pizza".to_string(),
            amount: Money::from_cents(1500),
        };

        runner
            .run(
                ctx.clone(),
                CompensationEntry::new("send_bill", CompensationAction::RefundCustomer, &bill)
                    .unwrap(),
            )
            .await
            .unwrap();
        runner
            .run(
                ctx,
                CompensationEntry::new(
                    "update_inventory",
                    CompensationAction::RevertInventory,
                    &items,
                )
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(services.billing.refund_calls(), 1);
        assert_eq!(services.inventory.revert_calls(), 1);
        assert_eq!(services.log.entries(), ["refund_customer", "revert_inventory"]);
    }

    #[tokio::test]
    async fn test_undecodable_input_is_non_retryable() {
        let services = InMemoryServices::new(DiscountRule::default());
        let runner = services.activity_services();
        let entry = CompensationEntry::new(
            "send_bill",
            CompensationAction::RefundCustomer,
            &"not a bill",
        )
        .unwrap();

        let err = runner
            .run(ActivityContext::detached("refund_customer"), entry)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), crate::classifier::reason::INVALID_PAYLOAD);
        assert_eq!(services.billing.refund_calls(), 0);
    }
}
