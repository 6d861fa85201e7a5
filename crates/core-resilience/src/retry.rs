//! Retry policy with exponential backoff
//!
//! Decides, after a failed attempt, whether another attempt should be made and
//! how long to wait first. Attempt numbers are 1-based and `max_attempts`
//! includes the first call, so `max_attempts = 3` means at most two retries.
//!
//! # Example
//!
//! ```
//! use storelink_core_resilience::retry::{RetryConfig, RetryDecision, RetryPolicy};
//! use storelink_core_resilience::ErrorCategory;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(RetryConfig {
//!     max_attempts: 3,
//!     base_delay: Duration::from_millis(100),
//!     multiplier: 2.0,
//!     ..Default::default()
//! });
//!
//! assert_eq!(
//!     policy.decide(ErrorCategory::Transient, 1, None),
//!     RetryDecision::Retry { delay: Duration::from_millis(100) }
//! );
//! assert_eq!(
//!     policy.decide(ErrorCategory::Transient, 2, None),
//!     RetryDecision::Retry { delay: Duration::from_millis(200) }
//! );
//! assert_eq!(policy.decide(ErrorCategory::Transient, 3, None), RetryDecision::Stop);
//! assert_eq!(policy.decide(ErrorCategory::Validation, 1, None), RetryDecision::Stop);
//! ```

use crate::error::{ErrorCategory, ResilienceError};
use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Backoff multiplier (exponential backoff)
    pub multiplier: f64,
    /// Maximum backoff delay
    pub max_delay: Duration,
    /// Categories eligible for another attempt
    pub retryable: BTreeSet<ErrorCategory>,
    /// Use the server's `Retry-After` hint for rate-limited calls
    pub honor_retry_after: bool,
    /// Random extra delay as a fraction of the computed delay (0.0 disables)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            retryable: default_retryable(),
            honor_retry_after: true,
            jitter_factor: 0.0,
        }
    }
}

/// Categories retried unless configured otherwise
pub fn default_retryable() -> BTreeSet<ErrorCategory> {
    [
        ErrorCategory::Transient,
        ErrorCategory::Network,
        ErrorCategory::RateLimit,
    ]
    .into_iter()
    .collect()
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.max_attempts == 0 {
            return Err(ResilienceError::InvalidConfig(
                "max_attempts must be >= 1".to_string(),
            ));
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(ResilienceError::InvalidConfig(format!(
                "multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ResilienceError::InvalidConfig(format!(
                "jitter_factor must be in [0, 1], got {}",
                self.jitter_factor
            )));
        }
        if self.retryable.contains(&ErrorCategory::CircuitOpen)
            || self.retryable.contains(&ErrorCategory::None)
        {
            return Err(ResilienceError::InvalidConfig(
                "retryable categories cannot include 'none' or 'circuit_open'".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make the next attempt
    Retry { delay: Duration },
    /// Surface the current failure
    Stop,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Policy that never retries
    pub fn never() -> Self {
        Self::new(RetryConfig {
            max_attempts: 1,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn is_retryable(&self, category: ErrorCategory) -> bool {
        self.config.retryable.contains(&category)
    }

    /// Decide what follows failed attempt number `attempt`
    pub fn decide(
        &self,
        category: ErrorCategory,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if !self.is_retryable(category) || attempt >= self.config.max_attempts {
            return RetryDecision::Stop;
        }

        let delay = match (category, retry_after) {
            (ErrorCategory::RateLimit, Some(hint)) if self.config.honor_retry_after => {
                hint.min(self.config.max_delay)
            }
            _ => self.jittered(self.backoff(attempt)),
        };
        RetryDecision::Retry { delay }
    }

    /// Un-jittered delay after failed attempt number `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.config.multiplier.powi(exponent);
        let millis = self.config.base_delay.as_millis() as f64 * factor;
        let cap = self.config.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= cap {
            self.config.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }
        let jitter = rand::rng().random_range(0.0..self.config.jitter_factor);
        (delay + delay.mul_f64(jitter)).min(self.config.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
