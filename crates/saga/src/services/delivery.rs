//! Delivery driver notification: a long-running, heartbeating activity.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::fault::ActivityLog;
use crate::classifier::{ActivityError, reason};
use crate::executor::ActivityContext;
use crate::order_fulfillment::ACTIVITY_NOTIFY_DELIVERY_DRIVER;

/// Trait for dispatching orders to delivery drivers.
#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Notifies a driver and waits for an acknowledgement, heartbeating
    /// while it waits.
    async fn notify_delivery_driver(
        &self,
        ctx: &ActivityContext,
        order_number: &str,
    ) -> Result<(), ActivityError>;
}

/// How the simulated driver behaves.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverBehavior {
    /// Poll on which the driver answers; `None` means never.
    pub responds_after_polls: Option<u32>,
    pub poll_interval: Duration,
    pub max_polls: u32,
    /// Whether the activity heartbeats between polls.
    pub heartbeats: bool,
}

impl Default for DriverBehavior {
    fn default() -> Self {
        Self {
            responds_after_polls: Some(3),
            poll_interval: Duration::from_secs(1),
            max_polls: 10,
            heartbeats: true,
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryDeliveryState {
    behavior: DriverBehavior,
    notified: Vec<String>,
    calls: usize,
}

/// In-memory delivery service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeliveryService {
    state: Arc<RwLock<InMemoryDeliveryState>>,
    log: ActivityLog,
}

impl InMemoryDeliveryService {
    /// Creates a delivery service whose driver behaves as described.
    pub fn new(behavior: DriverBehavior) -> Self {
        let service = Self::default();
        service.set_behavior(behavior);
        service
    }

    /// Records invocations in a shared log.
    pub fn with_log(mut self, log: ActivityLog) -> Self {
        self.log = log;
        self
    }

    pub fn set_behavior(&self, behavior: DriverBehavior) {
        self.state().behavior = behavior;
    }

    /// Orders a driver has acknowledged.
    pub fn notified(&self) -> Vec<String> {
        self.state().notified.clone()
    }

    /// Returns the number of `notify_delivery_driver` calls.
    pub fn call_count(&self) -> usize {
        self.state().calls
    }

    fn state(&self) -> RwLockWriteGuard<'_, InMemoryDeliveryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DeliveryService for InMemoryDeliveryService {
    async fn notify_delivery_driver(
        &self,
        ctx: &ActivityContext,
        order_number: &str,
    ) -> Result<(), ActivityError> {
        self.log.record(ACTIVITY_NOTIFY_DELIVERY_DRIVER);
        let behavior = {
            let mut state = self.state();
            state.calls += 1;
            state.behavior.clone()
        };

        for poll in 0..behavior.max_polls {
            if behavior.responds_after_polls == Some(poll) {
                tracing::info!(order_number, poll, "delivery driver responded");
                self.state().notified.push(order_number.to_string());
                return Ok(());
            }
            if behavior.heartbeats {
                ctx.heartbeat();
            }
            tokio::time::sleep(behavior.poll_interval).await;
        }

        Err(ActivityError::retryable(
            reason::DRIVER_UNRESPONSIVE,
            format!("no driver responded for order {order_number}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ErrorKind, classify};

    #[tokio::test(start_paused = true)]
    async fn test_driver_responds() {
        let service = InMemoryDeliveryService::new(DriverBehavior::default());
        let ctx = ActivityContext::detached(ACTIVITY_NOTIFY_DELIVERY_DRIVER);

        service.notify_delivery_driver(&ctx, "Z1238").await.unwrap();
        assert_eq!(service.notified(), ["Z1238"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_driver_is_retryable() {
        let service = InMemoryDeliveryService::new(DriverBehavior {
            responds_after_polls: None,
            ..Default::default()
        });
        let ctx = ActivityContext::detached(ACTIVITY_NOTIFY_DELIVERY_DRIVER);
        let start = tokio::time::Instant::now();

        let err = service
            .notify_delivery_driver(&ctx, "Z1238")
            .await
            .unwrap_err();
        let c = classify(&err);
        assert_eq!(c.kind, ErrorKind::Retryable);
        assert_eq!(c.reason, reason::DRIVER_UNRESPONSIVE);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert!(service.notified().is_empty());
    }
}
