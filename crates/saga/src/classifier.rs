//! Activity failures and their classification.
//!
//! Activities raise a typed [`ActivityError`]. The executor never inspects
//! error messages; it only looks at the [`Classification`] produced by
//! [`classify`], which tells the retry evaluator what kind of failure it is
//! and carries a stable reason code for diagnostics.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable reason codes reported by the engine and the simulated services.
pub mod reason {
    /// The bill would charge a negative amount.
    pub const INVALID_CHARGE_AMOUNT: &str = "InvalidChargeAmount";
    /// The payment card number is malformed.
    pub const CREDIT_CARD_INVALID: &str = "CreditCardInvalid";
    /// The delivery driver never acknowledged the notification.
    pub const DRIVER_UNRESPONSIVE: &str = "DriverUnresponsive";
    /// The delivery address is beyond the configured radius.
    pub const OUT_OF_SERVICE_AREA: &str = "OutOfServiceArea";
    /// An attempt ran past its start-to-close deadline.
    pub const START_TO_CLOSE_TIMEOUT: &str = "StartToCloseTimeout";
    /// An attempt stopped heartbeating.
    pub const HEARTBEAT_TIMEOUT: &str = "HeartbeatTimeout";
    /// The call never reached the service.
    pub const TRANSPORT_ERROR: &str = "TransportError";
    /// The activity input or output could not be decoded.
    pub const INVALID_PAYLOAD: &str = "InvalidPayload";
    /// The workflow was cancelled while the step was in flight.
    pub const CANCELLED: &str = "Cancelled";
    /// Any failure the activity did not tag.
    pub const UNCLASSIFIED: &str = "Unclassified";
}

/// How the engine must treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transient; retry under the step's policy.
    Retryable,
    /// A named business-rule violation; retrying cannot help.
    NonRetryable,
    /// Never retried, regardless of policy.
    Fatal,
}

impl ErrorKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Retryable => "Retryable",
            ErrorKind::NonRetryable => "NonRetryable",
            ErrorKind::Fatal => "Fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extra context attached to a failure, e.g. the offending amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FailureDetail {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureDetail::Number(n) => write!(f, "{n}"),
            FailureDetail::Text(t) => write!(f, "{t}"),
        }
    }
}

/// The label the classifier puts on a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ErrorKind,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<FailureDetail>,
}

impl Classification {
    /// Creates a classification without detail.
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            detail: None,
        }
    }

    /// Attaches a detail value.
    pub fn with_detail(mut self, detail: FailureDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// A failure raised by an activity call, or observed by the executor while
/// running one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActivityError {
    /// A failure tagged by the activity author.
    #[error("{message}")]
    Application {
        reason: String,
        message: String,
        non_retryable: bool,
        detail: Option<FailureDetail>,
    },

    /// A failure that must end the step immediately.
    #[error("{message}")]
    Fatal { reason: String, message: String },

    /// The attempt did not finish before its deadline.
    #[error("Activity did not complete within {0:?}")]
    StartToCloseTimeout(Duration),

    /// The attempt stopped heartbeating.
    #[error("No heartbeat received within {0:?}")]
    HeartbeatTimeout(Duration),

    /// The call could not be delivered to the service.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The workflow was cancelled.
    #[error("Activity cancelled")]
    Cancelled,

    /// An untagged failure.
    #[error("{0}")]
    Other(String),
}

impl ActivityError {
    /// A tagged failure that may be retried.
    pub fn retryable(reason: impl Into<String>, message: impl Into<String>) -> Self {
        ActivityError::Application {
            reason: reason.into(),
            message: message.into(),
            non_retryable: false,
            detail: None,
        }
    }

    /// A tagged business-rule violation.
    pub fn non_retryable(reason: impl Into<String>, message: impl Into<String>) -> Self {
        ActivityError::Application {
            reason: reason.into(),
            message: message.into(),
            non_retryable: true,
            detail: None,
        }
    }

    /// A failure that is never retried.
    pub fn fatal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        ActivityError::Fatal {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Attaches a detail value. Only tagged application failures carry one.
    pub fn with_detail(mut self, value: FailureDetail) -> Self {
        if let ActivityError::Application { detail, .. } = &mut self {
            *detail = Some(value);
        }
        self
    }

    /// Returns the reason code of this failure.
    pub fn reason(&self) -> &str {
        match self {
            ActivityError::Application { reason, .. } | ActivityError::Fatal { reason, .. } => {
                reason
            }
            ActivityError::StartToCloseTimeout(_) => reason::START_TO_CLOSE_TIMEOUT,
            ActivityError::HeartbeatTimeout(_) => reason::HEARTBEAT_TIMEOUT,
            ActivityError::Transport(_) => reason::TRANSPORT_ERROR,
            ActivityError::Cancelled => reason::CANCELLED,
            ActivityError::Other(_) => reason::UNCLASSIFIED,
        }
    }
}

impl From<serde_json::Error> for ActivityError {
    fn from(err: serde_json::Error) -> Self {
        ActivityError::non_retryable(reason::INVALID_PAYLOAD, err.to_string())
    }
}

/// Labels a failure. Pure: the same error always yields the same label.
pub fn classify(error: &ActivityError) -> Classification {
    let kind = match error {
        ActivityError::Application {
            non_retryable: true,
            ..
        } => ErrorKind::NonRetryable,
        ActivityError::Fatal { .. } | ActivityError::Cancelled => ErrorKind::Fatal,
        ActivityError::Application { .. }
        | ActivityError::StartToCloseTimeout(_)
        | ActivityError::HeartbeatTimeout(_)
        | ActivityError::Transport(_)
        | ActivityError::Other(_) => ErrorKind::Retryable,
    };

    let classification = Classification::new(kind, error.reason());
    match error {
        ActivityError::Application {
            detail: Some(detail),
            ..
        } => classification.with_detail(detail.clone()),
        _ => classification,
    }
}
