//! Storelink Core Resilience: fault tolerance for storefront API calls
//!
//! # Overview
//!
//! This crate wraps calls to a remote storefront API with the pieces needed to
//! survive a flaky remote:
//!
//! - **Error Classifier**: Maps a response or transport error to an [`ErrorCategory`]
//! - **Retry Policy**: Exponential backoff for retryable categories, honoring `Retry-After`
//! - **Circuit Breaker**: Sliding-window failure rate per endpoint, fail fast when open
//! - **Correlation Context**: Per-flow correlation id stack, isolated between concurrent flows
//! - **Telemetry Dispatcher**: Ordered, non-blocking delivery of retry/transition/call events
//! - **Resilient Invoker**: Composes all of the above around one logical call
//!
//! # Key Principles
//!
//! The engine knows nothing about HTTP clients or storefront schemas. A
//! transport is plugged in through [`Downstream`], and events leave through a
//! [`TelemetrySink`]. A failing or slow sink never changes what the caller
//! receives.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │ CallRequest (+ correlation id)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Correlation Context               │  ← Scope per logical call
//! │  (task-local stack, LIFO restore)       │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (Sliding window, half-open trials)     │
//! └─────────────┬───────────────────────────┘
//!               │ permit
//!               ▼
//!          Downstream call
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Error Classifier                  │  ← Category per outcome
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Policy                      │  ← Backoff or stop
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!        Result to caller
//!
//!  Throughout:
//!   Telemetry Dispatcher → bounded queue → TelemetrySink (isolated worker)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use storelink_core_resilience::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Storefront;
//!
//! #[async_trait::async_trait]
//! impl Downstream for Storefront {
//!     async fn call(
//!         &self,
//!         _endpoint: &str,
//!         _method: &str,
//!         _cancel: &CancellationToken,
//!     ) -> Result<CallResponse, CallError> {
//!         Ok(CallResponse::new(200))
//!     }
//! }
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let invoker = ResilientInvoker::builder()
//!     .retry(RetryConfig::default())
//!     .circuit_breaker(CircuitBreakerConfig::default())
//!     .build()?;
//!
//! let request = CallRequest::get("/products").with_correlation_id("order-42");
//! let result = invoker
//!     .invoke(&Storefront, &request, &CancellationToken::new())
//!     .await?;
//! assert_eq!(result.response.status, 200);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod classifier;
pub mod correlation;
pub mod error;
pub mod invoker;
pub mod outcome;
pub mod retry;
pub mod telemetry;
pub mod window;

// Re-export main types for convenience
pub use circuit_breaker::{
    BreakerScope, CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry,
    CircuitSnapshot, CircuitState,
};
pub use classifier::{classify, classify_result, classify_status};
pub use correlation::{CorrelationContext, CorrelationScope};
pub use error::{ErrorCategory, ResilienceError, TelemetryError};
pub use invoker::{
    CallRequest, Downstream, Invocation, InvokerConfig, ResilientInvoker, ResilientInvokerBuilder,
};
pub use outcome::{CallError, CallErrorKind, CallOutcome, CallResponse};
pub use retry::{RetryConfig, RetryDecision, RetryPolicy};
pub use telemetry::{
    ApiCallEvent, CircuitTransitionEvent, MemoryTelemetrySink, NoopTelemetrySink, RetryEvent,
    TelemetryConfig, TelemetryDispatcher, TelemetryEvent, TelemetrySink,
};
pub use window::FailureWindow;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use storelink_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{BreakerScope, CircuitBreakerConfig, CircuitState};
    pub use super::correlation::CorrelationContext;
    pub use super::error::{ErrorCategory, ResilienceError};
    pub use super::invoker::{CallRequest, Downstream, ResilientInvoker};
    pub use super::outcome::{CallError, CallResponse};
    pub use super::retry::RetryConfig;
    pub use super::telemetry::{TelemetryConfig, TelemetryDispatcher, TelemetrySink};
}
