//! Inventory service trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use domain::Pizza;

use super::fault::{ActivityLog, Fault, FaultPlan};
use crate::classifier::ActivityError;
use crate::executor::ActivityContext;
use crate::order_fulfillment::{ACTIVITY_REVERT_INVENTORY, STEP_UPDATE_INVENTORY};

/// Trait for inventory management operations.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Takes the ordered pizzas out of available stock.
    async fn update_inventory(
        &self,
        ctx: &ActivityContext,
        items: &[Pizza],
    ) -> Result<(), ActivityError>;

    /// Returns previously taken pizzas to stock.
    async fn revert_inventory(
        &self,
        ctx: &ActivityContext,
        items: &[Pizza],
    ) -> Result<(), ActivityError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    reserved: usize,
    update_calls: usize,
    revert_calls: usize,
    faults: FaultPlan,
}

/// In-memory inventory service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<RwLock<InMemoryInventoryState>>,
    log: ActivityLog,
}

impl InMemoryInventoryService {
    /// Creates a new in-memory inventory service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records invocations in a shared log.
    pub fn with_log(mut self, log: ActivityLog) -> Self {
        self.log = log;
        self
    }

    /// Injects a fault into `update_inventory` or `revert_inventory`.
    pub fn set_fault(&self, operation: &str, fault: Fault) {
        self.state().faults.set(operation, fault);
    }

    /// Returns the number of pizzas currently taken out of stock.
    pub fn reserved_count(&self) -> usize {
        self.state().reserved
    }

    /// Returns the number of `update_inventory` calls.
    pub fn update_calls(&self) -> usize {
        self.state().update_calls
    }

    /// Returns the number of `revert_inventory` calls.
    pub fn revert_calls(&self) -> usize {
        self.state().revert_calls
    }

    fn state(&self) -> RwLockWriteGuard<'_, InMemoryInventoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn update_inventory(
        &self,
        _ctx: &ActivityContext,
        items: &[Pizza],
    ) -> Result<(), ActivityError> {
        self.log.record(STEP_UPDATE_INVENTORY);
        let injected = {
            let mut state = self.state();
            state.update_calls += 1;
            state.faults.next(STEP_UPDATE_INVENTORY)
        };
        if let Some(injected) = injected {
            injected.resolve().await?;
        }

        self.state().reserved += items.len();
        tracing::debug!(items = items.len(), "inventory updated");
        Ok(())
    }

    async fn revert_inventory(
        &self,
        _ctx: &ActivityContext,
        items: &[Pizza],
    ) -> Result<(), ActivityError> {
        self.log.record(ACTIVITY_REVERT_INVENTORY);
        let injected = {
            let mut state = self.state();
            state.revert_calls += 1;
            state.faults.next(ACTIVITY_REVERT_INVENTORY)
        };
        if let Some(injected) = injected {
            injected.resolve().await?;
        }

        let mut state = self.state();
        state.reserved = state.reserved.saturating_sub(items.len());
        tracing::debug!(items = items.len(), "inventory reverted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Money;

    fn items() -> Vec<Pizza> {
        vec![
            Pizza::new("Large, with mushrooms and onions", Money::from_cents(1500)),
            Pizza::new("Small, with pepperoni", Money::from_cents(1200)),
        ]
    }

    #[tokio::test]
    async fn test_update_and_revert() {
        let service = InMemoryInventoryService::new();
        let ctx = ActivityContext::detached(STEP_UPDATE_INVENTORY);

        service.update_inventory(&ctx, &items()).await.unwrap();
        assert_eq!(service.reserved_count(), 2);

        service.revert_inventory(&ctx, &items()).await.unwrap();
        assert_eq!(service.reserved_count(), 0);
        assert_eq!(service.update_calls(), 1);
        assert_eq!(service.revert_calls(), 1);
    }

    #[tokio::test]
    async fn test_fault_leaves_stock_untouched() {
        let service = InMemoryInventoryService::new();
        let ctx = ActivityContext::detached(STEP_UPDATE_INVENTORY);
        service.set_fault(
            STEP_UPDATE_INVENTORY,
            Fault::Always(ActivityError::Other("warehouse offline".into())),
        );

        assert!(service.update_inventory(&ctx, &items()).await.is_err());
        assert_eq!(service.reserved_count(), 0);
        assert_eq!(service.update_calls(), 1);
    }
}
