//! Engine configuration.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use domain::Money;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::executor::ActivityOptions;
use crate::retry::RetryPolicy;

/// Discount applied by the billing service to large orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRule {
    /// Bills strictly above this amount are discounted.
    pub threshold: Money,
    pub discount: Money,
}

impl Default for DiscountRule {
    fn default() -> Self {
        Self {
            threshold: Money::from_cents(3000),
            discount: Money::from_cents(500),
        }
    }
}

impl DiscountRule {
    /// Returns the amount to charge for a bill.
    pub fn apply(&self, amount: Money) -> Money {
        if amount > self.threshold {
            amount - self.discount
        } else {
            amount
        }
    }
}

/// Configuration of the fulfillment workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaConfig {
    /// Options for forward steps without an override.
    pub activity: ActivityOptions,
    /// Per-step overrides, keyed by step name.
    #[serde(default)]
    pub step_overrides: BTreeMap<String, ActivityOptions>,
    /// Options for compensation activities.
    pub compensation: ActivityOptions,
    /// Delivery orders farther than this are rejected.
    pub max_delivery_distance_km: u32,
    /// Discount the billing service is expected to apply. Billing takes its
    /// rule when it is constructed; the engine refuses a billing service
    /// that reports a different one.
    pub discount: DiscountRule,
    /// Durable pause between reserving inventory and billing.
    pub settle_period: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            activity: ActivityOptions::default(),
            step_overrides: BTreeMap::new(),
            compensation: ActivityOptions::default(),
            max_delivery_distance_km: 12,
            discount: DiscountRule::default(),
            settle_period: Duration::from_secs(3),
        }
    }
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `SAGA_CALL_TIMEOUT_SECS` | 5 |
    /// | `SAGA_HEARTBEAT_TIMEOUT_SECS` | 10 (0 disables) |
    /// | `SAGA_RETRY_INITIAL_INTERVAL_MS` | 1000 |
    /// | `SAGA_RETRY_BACKOFF_MULTIPLIER` | 2.0 |
    /// | `SAGA_RETRY_MAX_INTERVAL_SECS` | 10 |
    /// | `SAGA_RETRY_MAX_ATTEMPTS` | 3 |
    /// | `SAGA_COMPENSATION_MAX_ATTEMPTS` | 3 |
    /// | `SAGA_MAX_DELIVERY_DISTANCE_KM` | 12 |
    /// | `SAGA_DISCOUNT_THRESHOLD_CENTS` | 3000 |
    /// | `SAGA_DISCOUNT_CENTS` | 500 |
    /// | `SAGA_SETTLE_SECS` | 3 |
    pub fn from_env() -> Self {
        let retry = RetryPolicy::default()
            .with_initial_interval(Duration::from_millis(env_or(
                "SAGA_RETRY_INITIAL_INTERVAL_MS",
                1000,
            )))
            .with_backoff_multiplier(env_or("SAGA_RETRY_BACKOFF_MULTIPLIER", 2.0))
            .with_maximum_interval(Duration::from_secs(env_or("SAGA_RETRY_MAX_INTERVAL_SECS", 10)))
            .with_maximum_attempts(env_or("SAGA_RETRY_MAX_ATTEMPTS", 3));

        let activity = ActivityOptions::default()
            .with_start_to_close_timeout(Duration::from_secs(env_or("SAGA_CALL_TIMEOUT_SECS", 5)))
            .with_heartbeat_timeout(
                Some(Duration::from_secs(env_or("SAGA_HEARTBEAT_TIMEOUT_SECS", 10)))
                    .filter(|t| !t.is_zero()),
            )
            .with_retry_policy(retry.clone());

        let compensation = activity.clone().with_retry_policy(
            retry.with_maximum_attempts(env_or("SAGA_COMPENSATION_MAX_ATTEMPTS", 3)),
        );

        Self {
            activity,
            step_overrides: BTreeMap::new(),
            compensation,
            max_delivery_distance_km: env_or("SAGA_MAX_DELIVERY_DISTANCE_KM", 12),
            discount: DiscountRule {
                threshold: Money::from_cents(env_or("SAGA_DISCOUNT_THRESHOLD_CENTS", 3000)),
                discount: Money::from_cents(env_or("SAGA_DISCOUNT_CENTS", 500)),
            },
            settle_period: Duration::from_secs(env_or("SAGA_SETTLE_SECS", 3)),
        }
    }

    /// Overrides the options of one forward step.
    pub fn with_step_options(mut self, step: impl Into<String>, options: ActivityOptions) -> Self {
        self.step_overrides.insert(step.into(), options);
        self
    }

    /// Returns the options for a forward step.
    pub fn activity_options(&self, step: &str) -> &ActivityOptions {
        self.step_overrides.get(step).unwrap_or(&self.activity)
    }

    /// Checks every policy and limit.
    pub fn validate(&self) -> Result<(), SagaError> {
        self.activity.validate()?;
        self.compensation.validate()?;
        for (step, options) in &self.step_overrides {
            options
                .validate()
                .map_err(|e| SagaError::Config(format!("step '{step}': {e}")))?;
        }
        if self.discount.discount.is_negative() {
            return Err(SagaError::Config("discount must not be negative".to_string()));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
