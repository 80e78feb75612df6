//! The activity executor: runs one activity under its timeouts and retry
//! policy until it succeeds or fails terminally.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cancellation::CancelSignal;
use crate::classifier::{ActivityError, classify};
use crate::error::{SagaError, StepFailure};
use crate::heartbeat::{Heartbeat, HeartbeatMonitor};
use crate::journal::ExecutionJournal;
use crate::retry::{GiveUpCause, RetryDecision, RetryPolicy};

/// Per-step execution options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// Deadline for a single attempt.
    pub start_to_close_timeout: Duration,
    /// Maximum silence between heartbeats. `None` disables the check.
    pub heartbeat_timeout: Option<Duration>,
    pub retry_policy: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(5),
            heartbeat_timeout: Some(Duration::from_secs(10)),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ActivityOptions {
    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), SagaError> {
        if self.start_to_close_timeout.is_zero() {
            return Err(SagaError::Config(
                "start_to_close_timeout must be positive".to_string(),
            ));
        }
        self.retry_policy.validate()
    }
}

/// What an activity body sees of its own invocation.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    step: String,
    attempt: u32,
    heartbeat: Heartbeat,
    cancel: CancelSignal,
}

impl ActivityContext {
    pub fn new(step: impl Into<String>, attempt: u32, heartbeat: Heartbeat, cancel: CancelSignal) -> Self {
        Self {
            step: step.into(),
            attempt,
            heartbeat,
            cancel,
        }
    }

    /// A context for calling an activity outside the executor.
    pub fn detached(step: impl Into<String>) -> Self {
        let (_, heartbeat) = HeartbeatMonitor::start(None);
        Self::new(step, 1, heartbeat, CancelSignal::new())
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    /// The 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reports that the activity is still making progress.
    pub fn heartbeat(&self) {
        self.heartbeat.signal();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Bookkeeping for one attempt of one activity.
#[derive(Debug, Clone)]
pub struct ActivityInvocation {
    pub step: String,
    pub input: serde_json::Value,
    pub attempt: u32,
    pub deadline: Instant,
    /// Time since the first attempt in this evaluation started.
    pub elapsed: Duration,
}

/// Runs activities with timeouts, heartbeat supervision and retries.
#[derive(Debug, Clone, Default)]
pub struct ActivityExecutor {
    cancel: CancelSignal,
}

impl ActivityExecutor {
    /// An executor that is never cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor whose in-flight attempts and backoffs stop on `cancel`.
    pub fn with_cancellation(cancel: CancelSignal) -> Self {
        Self { cancel }
    }

    /// Executes `call` until it succeeds or the retry policy gives up.
    ///
    /// Every attempt is recorded in `journal` before `call` runs. Failures
    /// come back as `SagaError::Step`; journal errors are returned as-is.
    ///
    /// Attempt numbering continues from what `journal` has already recorded
    /// for `step`. An attempt that was recorded but never finished counts as
    /// timed out against the retry policy.
    #[tracing::instrument(skip_all, fields(step = %step))]
    pub async fn execute<I, O, F, Fut, J>(
        &self,
        step: &str,
        input: I,
        options: &ActivityOptions,
        journal: &mut J,
        mut call: F,
    ) -> Result<O, SagaError>
    where
        I: Serialize + Clone,
        F: FnMut(ActivityContext, I) -> Fut,
        Fut: Future<Output = Result<O, ActivityError>>,
        J: ExecutionJournal + ?Sized,
    {
        let first_started = Instant::now();
        let recorded = journal.recorded_attempts(step);
        let mut invocation = ActivityInvocation {
            step: step.to_string(),
            input: serde_json::to_value(&input)?,
            attempt: recorded + 1,
            deadline: first_started + options.start_to_close_timeout,
            elapsed: Duration::ZERO,
        };

        if recorded > 0 {
            let lost = ActivityError::StartToCloseTimeout(options.start_to_close_timeout);
            let classification = classify(&lost);
            if let RetryDecision::GiveUp(cause) =
                options.retry_policy.evaluate(&classification, recorded)
            {
                tracing::warn!(
                    attempts = recorded,
                    cause = ?cause,
                    "interrupted attempt exhausted the retry policy"
                );
                return Err(StepFailure {
                    step: step.to_string(),
                    classification,
                    attempts: recorded,
                    cause,
                    message: format!("attempt {recorded} was interrupted: {lost}"),
                }
                .into());
            }
            tracing::info!(recorded, "continuing after an interrupted attempt");
        }

        loop {
            let attempt_started = Instant::now();
            invocation.deadline = attempt_started + options.start_to_close_timeout;
            invocation.elapsed = attempt_started - first_started;
            journal.attempt_started(&invocation).await?;

            metrics::counter!("activity_attempts_total", "step" => step.to_string()).increment(1);
            tracing::debug!(attempt = invocation.attempt, "activity attempt started");

            let (monitor, heartbeat) = HeartbeatMonitor::start(options.heartbeat_timeout);
            let ctx = ActivityContext::new(step, invocation.attempt, heartbeat, self.cancel.clone());

            let outcome = if self.cancel.is_cancelled() {
                Err(ActivityError::Cancelled)
            } else {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(ActivityError::Cancelled),
                    silence = monitor.stalled() => Err(ActivityError::HeartbeatTimeout(silence)),
                    result = tokio::time::timeout_at(invocation.deadline, call(ctx, input.clone())) => {
                        result.unwrap_or(Err(ActivityError::StartToCloseTimeout(
                            options.start_to_close_timeout,
                        )))
                    }
                }
            };

            let heartbeats = monitor.signal_count();

            let error = match outcome {
                Ok(output) => {
                    tracing::debug!(
                        attempt = invocation.attempt,
                        elapsed_ms = first_started.elapsed().as_millis() as u64,
                        "activity succeeded"
                    );
                    return Ok(output);
                }
                Err(error) => error,
            };

            let classification = classify(&error);
            match options.retry_policy.evaluate(&classification, invocation.attempt) {
                RetryDecision::RetryAfter(interval) => {
                    tracing::warn!(
                        attempt = invocation.attempt,
                        heartbeats,
                        reason = %classification.reason,
                        retry_in_ms = interval.as_millis() as u64,
                        error = %error,
                        "activity attempt failed, retrying"
                    );
                    metrics::counter!("activity_retries_total", "step" => step.to_string())
                        .increment(1);

                    let cancelled = tokio::select! {
                        _ = self.cancel.cancelled() => true,
                        _ = tokio::time::sleep(interval) => false,
                    };
                    if cancelled {
                        let error = ActivityError::Cancelled;
                        return Err(StepFailure {
                            step: step.to_string(),
                            classification: classify(&error),
                            attempts: invocation.attempt,
                            cause: GiveUpCause::Fatal,
                            message: error.to_string(),
                        }
                        .into());
                    }
                    invocation.attempt += 1;
                }
                RetryDecision::GiveUp(cause) => {
                    tracing::warn!(
                        attempts = invocation.attempt,
                        heartbeats,
                        reason = %classification.reason,
                        kind = %classification.kind,
                        cause = ?cause,
                        error = %error,
                        "activity failed terminally"
                    );
                    return Err(StepFailure {
                        step: step.to_string(),
                        classification,
                        attempts: invocation.attempt,
                        cause,
                        message: error.to_string(),
                    }
                    .into());
                }
            }
        }
    }
}
