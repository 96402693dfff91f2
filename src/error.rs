use std::time::Duration;

use thiserror::Error;

use crate::session::conditions::ConditionKind;

/// Failures reported by the telemetry source collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Telemetry source not connected")]
    Disconnected,

    #[error("Telemetry source unavailable: {0}")]
    Unavailable(String),

    #[error("Telemetry request failed: {0}")]
    Request(String),
}

/// Failures reported by the remote flight service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Network timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Service error: {0}")]
    Other(String),
}

/// Tracker error types
#[derive(Error, Debug, Clone)]
pub enum TrackerError {
    #[error("A flight is already being tracked")]
    FlightAlreadyBound,

    #[error("No flight bound")]
    NoFlightBound,

    #[error("Invalid tracking state: {0}")]
    InvalidState(String),

    #[error("Tracking conditions not met: {0:?}")]
    ConditionsNotMet(Vec<ConditionKind>),

    #[error("Engines are already running, shut them down before ground handling")]
    EnginesRunning,

    #[error("Timed out after {waited:?} waiting for lock {name}")]
    LockTimeout { name: String, waited: Duration },

    #[error("Lock {name} was abandoned by a previous holder")]
    LockAbandoned { name: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sample mapping error: {0}")]
    Mapping(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl TrackerError {
    /// Lock and I/O failures that a background task may simply retry later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TrackerError::LockTimeout { .. }
                | TrackerError::LockAbandoned { .. }
                | TrackerError::Source(_)
                | TrackerError::Service(_)
        )
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(e: std::io::Error) -> Self {
        TrackerError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(e: serde_json::Error) -> Self {
        TrackerError::Serialization(e.to_string())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = TrackerError::LockTimeout {
            name: "save".to_string(),
            waited: Duration::from_secs(30),
        };
        assert!(timeout.is_transient());
        assert!(TrackerError::Service(ServiceError::Timeout).is_transient());
        assert!(!TrackerError::NoFlightBound.is_transient());
        assert!(!TrackerError::ConditionsNotMet(vec![ConditionKind::Fuel]).is_transient());
    }

    #[test]
    fn test_source_error_converts() {
        let err: TrackerError = SourceError::Disconnected.into();
        assert_eq!(err.to_string(), "Telemetry source not connected");
    }
}
