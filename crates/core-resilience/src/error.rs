//! Error types for the resilience engine

use crate::outcome::CallOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category assigned to every outcome of an outbound call
///
/// Categories are derived from an outcome by [`classify`](crate::classifier::classify)
/// and never stored on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The call succeeded
    None,
    /// Server-side failure (5xx) that may clear up on its own
    Transient,
    /// Connection-level transport failure
    Network,
    /// Cancellation, client timeout or HTTP 408
    Timeout,
    /// HTTP 401/403
    Auth,
    /// HTTP 400/422
    Validation,
    /// HTTP 404
    NotFound,
    /// HTTP 429
    RateLimit,
    /// An error that matched no other case
    Unknown,
    /// Engine-internal: the call was rejected by an open circuit
    CircuitOpen,
}

impl ErrorCategory {
    /// Categories a breaker counts as unhealthy samples
    pub fn trips_breaker(self) -> bool {
        matches!(
            self,
            ErrorCategory::Transient
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::RateLimit
                | ErrorCategory::Unknown
        )
    }

    /// Whether the category describes a successful call
    pub fn is_success(self) -> bool {
        self == ErrorCategory::None
    }

    /// Stable lowercase name used in logs and serialized events
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::None => "none",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Validation => "validation",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Unknown => "unknown",
            ErrorCategory::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s.trim().to_ascii_lowercase().as_str() {
            "none" => ErrorCategory::None,
            "transient" => ErrorCategory::Transient,
            "network" => ErrorCategory::Network,
            "timeout" => ErrorCategory::Timeout,
            "auth" => ErrorCategory::Auth,
            "validation" => ErrorCategory::Validation,
            "not_found" | "notfound" => ErrorCategory::NotFound,
            "rate_limit" | "ratelimit" => ErrorCategory::RateLimit,
            "unknown" => ErrorCategory::Unknown,
            "circuit_open" => ErrorCategory::CircuitOpen,
            other => {
                return Err(ResilienceError::InvalidConfig(format!(
                    "unknown error category '{}'",
                    other
                )))
            }
        };
        Ok(category)
    }
}

/// Errors surfaced to callers of the resilience engine
#[derive(Debug, Error, Clone)]
pub enum ResilienceError {
    /// The breaker for this endpoint is open and rejected the call
    #[error("Circuit breaker is open for {endpoint}, rejecting call")]
    CircuitOpen {
        endpoint: String,
        correlation_id: String,
    },

    /// The call failed; carries the last classified outcome
    #[error("{} {} failed after {} attempt(s): {}", .0.method, .0.endpoint, .0.attempt, .0.category)]
    CallFailed(Box<CallOutcome>),

    /// The caller's cancellation signal fired before the call completed
    #[error("Call to {endpoint} cancelled by caller")]
    Cancelled {
        endpoint: String,
        correlation_id: String,
    },

    /// Configuration rejected during validation
    #[error("Invalid resilience configuration: {0}")]
    InvalidConfig(String),
}

impl ResilienceError {
    /// Category callers can branch on for fallbacks
    pub fn category(&self) -> ErrorCategory {
        match self {
            ResilienceError::CircuitOpen { .. } => ErrorCategory::CircuitOpen,
            ResilienceError::CallFailed(outcome) => outcome.category,
            ResilienceError::Cancelled { .. } => ErrorCategory::Timeout,
            ResilienceError::InvalidConfig(_) => ErrorCategory::Unknown,
        }
    }

    /// The final outcome, when a downstream call was actually attempted
    pub fn outcome(&self) -> Option<&CallOutcome> {
        match self {
            ResilienceError::CallFailed(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Check if the call was short-circuited without reaching downstream
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }
}

/// Failure reported by a [`TelemetrySink`](crate::telemetry::TelemetrySink)
///
/// These never reach the caller of an invocation; the dispatcher logs and drops them.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Telemetry sink failed: {0}")]
    Sink(String),

    #[error("Telemetry sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}
