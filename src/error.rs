//! Error taxonomy for the monitoring core
//!
//! - `ValidationError`: malformed or out-of-range input, rejected before any state change
//! - `AssistantError`: assistant transport/timeout or unsafe output, always recovered locally
//! - `MonitorError`: the crate-level error returned by store and orchestrator operations

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::model::Metric;

/// Input rejected before any state change
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("unknown patient: {0}")]
    UnknownPatient(String),

    #[error("patient {0} is archived")]
    PatientArchived(String),

    #[error("patient already registered: {0}")]
    DuplicatePatient(String),

    #[error("display name must not be empty")]
    EmptyDisplayName,

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("timestamp {timestamp} is in the future (latest accepted {latest_accepted})")]
    FutureTimestamp {
        timestamp: DateTime<Utc>,
        latest_accepted: DateTime<Utc>,
    },

    #[error("{metric} expects a {expected} value")]
    WrongValueKind { metric: Metric, expected: &'static str },

    #[error("cannot parse {raw:?} as a value for {metric}")]
    Unparseable { metric: Metric, raw: String },

    #[error("{metric} value {value} is outside the physical range [{min}, {max}]")]
    OutOfRange { metric: Metric, value: f64, min: f64, max: f64 },

    #[error("invalid threshold band for {metric}: {reason}")]
    InvalidBand { metric: Metric, reason: String },

    #[error("at least one observation is required")]
    NoObservations,
}

/// Failure reported by an assistant backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("assistant call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("assistant transport failed: {0}")]
    Http(String),

    #[error("assistant provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("cannot decode assistant response: {0}")]
    Decode(String),
}

/// Recoverable assistant failures; never surfaced as request failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssistantError {
    #[error("assistant unavailable: {0}")]
    Unavailable(String),

    #[error("assistant response rejected: {0}")]
    ResponseInvalid(String),
}

impl From<TransportError> for AssistantError {
    fn from(err: TransportError) -> Self {
        AssistantError::Unavailable(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Assistant(#[from] AssistantError),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MonitorError {
    /// Returns the validation error if the request was rejected as malformed
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            MonitorError::Validation(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
