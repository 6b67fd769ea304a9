//! Error types for the telemetry engine

use std::fmt;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur inside the telemetry core.
///
/// None of these are fatal to the process: fetch failures retain the
/// last-known state and surface a staleness indicator, malformed payloads
/// drop the offending entry, and invalid configuration is rejected at the
/// point of assignment.
#[derive(Debug)]
pub enum EngineError {
    /// Threshold breakpoints are not ordered `caution <= warning <= danger`
    /// or are negative
    InvalidThresholds {
        caution: f64,
        warning: f64,
        danger: f64,
    },

    /// A baseline/liveness/history/alert-log fetch failed
    FetchFailed(String),

    /// A boundary payload was missing its node identity or otherwise unusable
    MalformedPayload(String),

    /// The engine task is gone and can no longer accept commands
    EngineClosed,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidThresholds {
                caution,
                warning,
                danger,
            } => write!(
                f,
                "invalid threshold profile: caution {caution} / warning {warning} / danger {danger} must be non-negative and non-decreasing"
            ),
            EngineError::FetchFailed(msg) => write!(f, "fetch failed: {msg}"),
            EngineError::MalformedPayload(msg) => write!(f, "malformed payload: {msg}"),
            EngineError::EngineClosed => write!(f, "engine is no longer running"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::FetchFailed(err.to_string())
    }
}
