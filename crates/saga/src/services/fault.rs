//! Failure injection and call logging for the in-memory services.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::classifier::ActivityError;

/// A failure to inject into an in-memory service operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Fail the next `times` calls with `error`, then behave normally.
    FailTimes { times: u32, error: ActivityError },
    /// Fail every call with the given error.
    Always(ActivityError),
    /// Never return. The executor's deadline or heartbeat check ends the
    /// attempt.
    Stall,
}

impl Fault {
    /// Fails the next `times` calls with an untagged transient error.
    pub fn transient(times: u32) -> Self {
        Fault::FailTimes {
            times,
            error: ActivityError::Transport("injected transient failure".to_string()),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Injected {
    Fail(ActivityError),
    Stall,
}

impl Injected {
    /// Turns the injected fault into the operation's result.
    pub(crate) async fn resolve(self) -> Result<(), ActivityError> {
        match self {
            Injected::Fail(error) => Err(error),
            Injected::Stall => std::future::pending().await,
        }
    }
}

/// Faults configured per operation name.
#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
    faults: HashMap<String, Fault>,
}

impl FaultPlan {
    pub(crate) fn set(&mut self, operation: &str, fault: Fault) {
        self.faults.insert(operation.to_string(), fault);
    }

    /// Consumes the fault for one call of `operation`, if any.
    pub(crate) fn next(&mut self, operation: &str) -> Option<Injected> {
        let fault = self.faults.get_mut(operation)?;
        let injected = match fault {
            Fault::FailTimes { times: 0, .. } => None,
            Fault::FailTimes { times, error } => {
                *times -= 1;
                Some(Injected::Fail(error.clone()))
            }
            Fault::Always(error) => Some(Injected::Fail(error.clone())),
            Fault::Stall => Some(Injected::Stall),
        };
        if matches!(fault, Fault::FailTimes { times: 0, .. }) {
            self.faults.remove(operation);
        }
        injected
    }
}

/// Ordered record of activity invocations, shared across services.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, activity: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(activity.to_string());
    }

    /// Every recorded invocation, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of invocations of one activity.
    pub fn count(&self, activity: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| a.as_str() == activity)
            .count()
    }
}
