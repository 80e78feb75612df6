//! Distance estimation service trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use domain::{Address, Distance};

use super::fault::{ActivityLog, Fault, FaultPlan};
use crate::classifier::ActivityError;
use crate::executor::ActivityContext;
use crate::order_fulfillment::STEP_GET_DISTANCE;

/// Trait for estimating delivery distances.
#[async_trait]
pub trait DistanceService: Send + Sync {
    /// Estimates the distance from the store to an address.
    async fn get_distance(
        &self,
        ctx: &ActivityContext,
        address: &Address,
    ) -> Result<Distance, ActivityError>;
}

/// The store's rough distance heuristic: longer addresses are farther away.
/// Lengths are measured in UTF-8 bytes.
pub fn estimate_distance(address: &Address) -> Distance {
    let raw = address.line1.len() as i64 + address.line2.len() as i64 - 10;
    let kilometers = if raw < 1 { 5 } else { raw };
    Distance {
        kilometers: u32::try_from(kilometers).unwrap_or(u32::MAX),
    }
}

#[derive(Debug, Default)]
struct InMemoryDistanceState {
    faults: FaultPlan,
    calls: usize,
}

/// In-memory distance service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDistanceService {
    state: Arc<RwLock<InMemoryDistanceState>>,
    log: ActivityLog,
}

impl InMemoryDistanceService {
    /// Creates a new in-memory distance service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records invocations in a shared log.
    pub fn with_log(mut self, log: ActivityLog) -> Self {
        self.log = log;
        self
    }

    /// Injects a fault into `get_distance`.
    pub fn set_fault(&self, fault: Fault) {
        self.state().faults.set(STEP_GET_DISTANCE, fault);
    }

    /// Returns the number of `get_distance` calls.
    pub fn call_count(&self) -> usize {
        self.state().calls
    }

    fn state(&self) -> RwLockWriteGuard<'_, InMemoryDistanceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DistanceService for InMemoryDistanceService {
    async fn get_distance(
        &self,
        _ctx: &ActivityContext,
        address: &Address,
    ) -> Result<Distance, ActivityError> {
        self.log.record(STEP_GET_DISTANCE);
        let injected = {
            let mut state = self.state();
            state.calls += 1;
            state.faults.next(STEP_GET_DISTANCE)
        };
        if let Some(injected) = injected {
            injected.resolve().await?;
        }

        let distance = estimate_distance(address);
        tracing::debug!(kilometers = distance.kilometers, "estimated delivery distance");
        Ok(distance)
    }
}
