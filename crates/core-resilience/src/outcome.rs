//! Shapes exchanged with the downstream call and produced per attempt

use crate::error::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Response descriptor returned by a downstream call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResponse {
    /// HTTP status code
    pub status: u16,
    /// Server-supplied `Retry-After` hint, when present
    pub retry_after: Option<Duration>,
}

impl CallResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Kind of transport-level failure raised by a downstream call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
    /// The call was cancelled cooperatively
    Cancelled,
    /// The call exceeded its time budget
    TimedOut,
    /// Connection could not be established or was reset
    Connect,
    /// Anything else the transport reported
    Other,
}

/// Transport-level error raised instead of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    pub kind: CallErrorKind,
    pub message: String,
}

impl CallError {
    pub fn new(kind: CallErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(CallErrorKind::Cancelled, "call cancelled")
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::new(
            CallErrorKind::TimedOut,
            format!("call timed out after {:?}", after),
        )
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(CallErrorKind::Connect, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(CallErrorKind::Other, message)
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CallError {}

/// Immutable record of one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub endpoint: String,
    pub method: String,
    #[serde(rename = "duration_ms", with = "crate::telemetry::duration_ms")]
    pub duration: Duration,
    pub success: bool,
    pub status_code: Option<u16>,
    pub category: ErrorCategory,
    pub correlation_id: String,
    /// 1-based attempt number within the logical call
    pub attempt: u32,
}

impl CallOutcome {
    /// Outcome produced when the breaker rejects a call before it is sent
    pub fn circuit_open(
        endpoint: &str,
        method: &str,
        correlation_id: &str,
        attempt: u32,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            duration: Duration::ZERO,
            success: false,
            status_code: None,
            category: ErrorCategory::CircuitOpen,
            correlation_id: correlation_id.to_string(),
            attempt,
        }
    }
}
