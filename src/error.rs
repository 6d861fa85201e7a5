/*!
 * Error types for Storelink
 */

use std::io;
use storelink_core_resilience::{CallOutcome, ErrorCategory, ResilienceError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorelinkError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CALL_FAILED: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_CIRCUIT_OPEN: i32 = 3;

#[derive(Debug, Error)]
pub enum StorelinkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse configuration: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A call through the resilience engine failed
    #[error(transparent)]
    Resilience(#[from] ResilienceError),
}

impl StorelinkError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            StorelinkError::Resilience(ResilienceError::CircuitOpen { .. }) => EXIT_CIRCUIT_OPEN,
            StorelinkError::Resilience(ResilienceError::InvalidConfig(_)) => EXIT_FATAL,
            StorelinkError::Resilience(_) => EXIT_CALL_FAILED,
            _ => EXIT_FATAL,
        }
    }

    /// Outcome of the last attempt, when a call ran and failed
    pub fn outcome(&self) -> Option<&CallOutcome> {
        match self {
            StorelinkError::Resilience(err) => err.outcome(),
            _ => None,
        }
    }

    /// Classified category of a failed call, if this error came from one
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            StorelinkError::Resilience(ResilienceError::InvalidConfig(_)) => None,
            StorelinkError::Resilience(err) => Some(err.category()),
            _ => None,
        }
    }
}
