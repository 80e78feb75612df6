//! Retry policies and the retry evaluator.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::{Classification, ErrorKind};
use crate::error::SagaError;

/// Retry policy attached to a step.
///
/// The interval before retry `n` (1-based attempt that just failed) is
/// `min(initial_interval * backoff_multiplier^(n-1), maximum_interval)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_multiplier: f64,
    pub maximum_interval: Duration,
    /// Total attempts allowed, including the first.
    pub maximum_attempts: u32,
    /// Reason codes that are never retried, whatever their kind.
    #[serde(default)]
    pub non_retryable_reasons: BTreeSet<String>,
    /// Whether every `NonRetryable` failure gives up immediately.
    #[serde(default = "default_true")]
    pub exempt_all_non_retryable: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            maximum_interval: Duration::from_secs(10),
            maximum_attempts: 3,
            non_retryable_reasons: BTreeSet::new(),
            exempt_all_non_retryable: true,
        }
    }
}

/// Why the evaluator stopped retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GiveUpCause {
    /// The failure was fatal.
    Fatal,
    /// The failure is exempt from retry.
    NonRetryable,
    /// The policy's attempt budget is spent.
    AttemptsExhausted,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp(GiveUpCause),
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = attempts;
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_maximum_interval(mut self, interval: Duration) -> Self {
        self.maximum_interval = interval;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Adds a reason code to the exempt set.
    pub fn with_non_retryable_reason(mut self, reason: impl Into<String>) -> Self {
        self.non_retryable_reasons.insert(reason.into());
        self
    }

    /// Lets `NonRetryable` failures whose reason is not in the exempt set
    /// be retried like transient ones.
    pub fn retry_unlisted_non_retryable(mut self) -> Self {
        self.exempt_all_non_retryable = false;
        self
    }

    /// Checks that the policy is usable.
    pub fn validate(&self) -> Result<(), SagaError> {
        if self.maximum_attempts == 0 {
            return Err(SagaError::Config(
                "maximum_attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(SagaError::Config(format!(
                "backoff_multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.maximum_interval < self.initial_interval {
            return Err(SagaError::Config(format!(
                "maximum_interval ({:?}) must not be shorter than initial_interval ({:?})",
                self.maximum_interval, self.initial_interval
            )));
        }
        Ok(())
    }

    /// Returns the backoff interval after the given failed attempt.
    pub fn interval_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.maximum_interval.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }

    /// Decides whether the attempt that just failed should be retried.
    pub fn evaluate(&self, classification: &Classification, attempt: u32) -> RetryDecision {
        if classification.kind == ErrorKind::Fatal {
            return RetryDecision::GiveUp(GiveUpCause::Fatal);
        }
        if self.non_retryable_reasons.contains(&classification.reason) {
            return RetryDecision::GiveUp(GiveUpCause::NonRetryable);
        }
        if classification.kind == ErrorKind::NonRetryable && self.exempt_all_non_retryable {
            return RetryDecision::GiveUp(GiveUpCause::NonRetryable);
        }
        if attempt >= self.maximum_attempts {
            return RetryDecision::GiveUp(GiveUpCause::AttemptsExhausted);
        }
        RetryDecision::RetryAfter(self.interval_for_attempt(attempt))
    }
}
