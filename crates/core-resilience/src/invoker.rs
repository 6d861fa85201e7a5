//! Resilient invocation of downstream calls
//!
//! [`ResilientInvoker`] runs one logical call end to end:
//!
//! 1. resolve the correlation id (explicit on the request, or ambient)
//! 2. ask the endpoint's breaker for a permit, failing fast when it is open
//! 3. execute the downstream call, bounded by an optional per-attempt timeout
//!    and the caller's cancellation token
//! 4. classify the outcome and feed it back into the breaker
//! 5. consult the retry policy, sleeping (cancellably) before the next attempt
//! 6. emit exactly one completion event for the logical call
//!
//! Telemetry goes through a [`TelemetryDispatcher`], so a slow or failing sink
//! never changes what the caller receives.

use crate::circuit_breaker::{
    BreakerScope, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
use crate::classifier::classify_result;
use crate::correlation::{CorrelationContext, DEFAULT_MAX_LEN};
use crate::error::{ErrorCategory, ResilienceError};
use crate::outcome::{CallError, CallOutcome, CallResponse};
use crate::retry::{RetryConfig, RetryDecision, RetryPolicy};
use crate::telemetry::{ApiCallEvent, RetryEvent, TelemetryDispatcher, TelemetryEvent};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

/// The underlying call the engine protects
///
/// Implementations should return `Ok` for any response the remote produced,
/// whatever its status, and `Err` only for transport-level failures. They
/// should stop promptly once `cancel` fires.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn call(
        &self,
        endpoint: &str,
        method: &str,
        cancel: &CancellationToken,
    ) -> Result<CallResponse, CallError>;
}

/// One logical call to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub endpoint: String,
    pub method: String,
    /// Installed as the flow's correlation id for the duration of the call
    pub correlation_id: Option<String>,
}

impl CallRequest {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            correlation_id: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new("GET", endpoint)
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// A successful logical call
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub response: CallResponse,
    /// Outcome of the final (successful) attempt
    pub outcome: CallOutcome,
    /// Downstream calls made, including the successful one
    pub attempts: u32,
    /// Wall-clock duration of the logical call
    pub duration: Duration,
}

/// Settings that apply to the invoker itself
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Upper bound for a single downstream attempt
    pub attempt_timeout: Option<Duration>,
    /// Length limit applied to caller-supplied correlation ids
    pub correlation_max_len: usize,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Some(Duration::from_secs(30)),
            correlation_max_len: DEFAULT_MAX_LEN,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResilientInvoker {
    breakers: CircuitBreakerRegistry,
    retry: RetryPolicy,
    telemetry: TelemetryDispatcher,
    config: InvokerConfig,
}

impl Default for ResilientInvoker {
    fn default() -> Self {
        Self::new_default()
    }
}

impl ResilientInvoker {
    pub fn builder() -> ResilientInvokerBuilder {
        ResilientInvokerBuilder::default()
    }

    /// Invoker with default settings and telemetry disabled
    pub fn new_default() -> Self {
        let telemetry = TelemetryDispatcher::disabled();
        Self {
            breakers: CircuitBreakerRegistry::new(
                CircuitBreakerConfig::default(),
                BreakerScope::default(),
                telemetry.clone(),
            ),
            retry: RetryPolicy::default(),
            telemetry,
            config: InvokerConfig::default(),
        }
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn telemetry(&self) -> &TelemetryDispatcher {
        &self.telemetry
    }

    /// Run `request` through the full resilience pipeline
    ///
    /// Callers outside a correlation flow get a fresh one for the call.
    pub async fn invoke<D>(
        &self,
        downstream: &D,
        request: &CallRequest,
        cancel: &CancellationToken,
    ) -> Result<Invocation, ResilienceError>
    where
        D: Downstream + ?Sized,
    {
        if CorrelationContext::in_flow() {
            self.invoke_in_flow(downstream, request, cancel).await
        } else {
            CorrelationContext::flow(self.invoke_in_flow(downstream, request, cancel)).await
        }
    }

    async fn invoke_in_flow<D>(
        &self,
        downstream: &D,
        request: &CallRequest,
        cancel: &CancellationToken,
    ) -> Result<Invocation, ResilienceError>
    where
        D: Downstream + ?Sized,
    {
        let _scope = request.correlation_id.as_deref().map(|id| {
            CorrelationContext::start_scope_with_limit(Some(id), self.config.correlation_max_len)
        });
        let correlation_id = CorrelationContext::current();

        let span = info_span!(
            "storefront_call",
            endpoint = %request.endpoint,
            method = %request.method,
            correlation_id = %correlation_id,
        );
        self.run_attempts(downstream, request, &correlation_id, cancel)
            .instrument(span)
            .await
    }

    async fn run_attempts<D>(
        &self,
        downstream: &D,
        request: &CallRequest,
        correlation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Invocation, ResilienceError>
    where
        D: Downstream + ?Sized,
    {
        let endpoint = request.endpoint.as_str();
        let method = request.method.as_str();
        let started = Instant::now();
        let breaker = self.breakers.get(endpoint);
        let mut attempt: u32 = 1;

        loop {
            let permit = match breaker.try_acquire(correlation_id) {
                Ok(permit) => permit,
                Err(err) => {
                    debug!(attempt, "circuit open, call rejected without reaching downstream");
                    let outcome = CallOutcome::circuit_open(endpoint, method, correlation_id, attempt);
                    self.complete(&outcome, started.elapsed(), attempt - 1);
                    return Err(err);
                }
            };

            if cancel.is_cancelled() {
                permit.release();
                return Err(self.cancelled(endpoint, method, correlation_id, attempt - 1, started));
            }

            let attempt_started = Instant::now();
            let result = self.attempt(downstream, endpoint, method, cancel).await;
            let elapsed = attempt_started.elapsed();

            let caller_cancelled = cancel.is_cancelled();
            let category = classify_result(&result);
            let (status_code, retry_after) = match &result {
                Ok(response) => (Some(response.status), response.retry_after),
                Err(_) => (None, None),
            };
            let outcome = CallOutcome {
                endpoint: endpoint.to_string(),
                method: method.to_string(),
                duration: elapsed,
                success: category.is_success(),
                status_code,
                category,
                correlation_id: correlation_id.to_string(),
                attempt,
            };

            // Caller impatience says nothing about the remote's health
            if caller_cancelled {
                permit.release();
            } else {
                permit.record(category);
            }

            match result {
                Ok(response) if outcome.success => {
                    self.complete(&outcome, started.elapsed(), attempt);
                    return Ok(Invocation {
                        response,
                        outcome,
                        attempts: attempt,
                        duration: started.elapsed(),
                    });
                }
                Err(ref err) => {
                    debug!(attempt, error = %err, %category, "downstream call failed");
                }
                Ok(_) => {
                    debug!(attempt, status = ?status_code, %category, "downstream call returned failure status");
                }
            }

            if caller_cancelled {
                self.complete(&outcome, started.elapsed(), attempt);
                return Err(ResilienceError::Cancelled {
                    endpoint: endpoint.to_string(),
                    correlation_id: correlation_id.to_string(),
                });
            }

            match self.retry.decide(category, attempt, retry_after) {
                RetryDecision::Stop => {
                    self.complete(&outcome, started.elapsed(), attempt);
                    return Err(ResilienceError::CallFailed(Box::new(outcome)));
                }
                RetryDecision::Retry { .. } if breaker.state() == CircuitState::Open => {
                    // Our own failure tripped the circuit; no attempt can follow
                    debug!(attempt, "circuit opened, abandoning retries");
                    let rejected =
                        CallOutcome::circuit_open(endpoint, method, correlation_id, attempt + 1);
                    self.complete(&rejected, started.elapsed(), attempt);
                    return Err(ResilienceError::CircuitOpen {
                        endpoint: endpoint.to_string(),
                        correlation_id: correlation_id.to_string(),
                    });
                }
                RetryDecision::Retry { delay } => {
                    debug!(attempt, delay_ms = delay.as_millis() as u64, %category, "scheduling retry");
                    self.telemetry.emit(TelemetryEvent::Retry(RetryEvent {
                        endpoint: endpoint.to_string(),
                        method: method.to_string(),
                        attempt,
                        delay,
                        status_code,
                        category,
                        correlation_id: correlation_id.to_string(),
                        timestamp: Utc::now(),
                    }));

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(self.cancelled(endpoint, method, correlation_id, attempt, started));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt<D>(
        &self,
        downstream: &D,
        endpoint: &str,
        method: &str,
        cancel: &CancellationToken,
    ) -> Result<CallResponse, CallError>
    where
        D: Downstream + ?Sized,
    {
        let call = async {
            match self.config.attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, downstream.call(endpoint, method, cancel))
                    .await
                    .unwrap_or_else(|_| Err(CallError::timed_out(limit))),
                None => downstream.call(endpoint, method, cancel).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CallError::cancelled()),
            result = call => result,
        }
    }

    fn cancelled(
        &self,
        endpoint: &str,
        method: &str,
        correlation_id: &str,
        attempts: u32,
        started: Instant,
    ) -> ResilienceError {
        let outcome = CallOutcome {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            duration: Duration::ZERO,
            success: false,
            status_code: None,
            category: ErrorCategory::Timeout,
            correlation_id: correlation_id.to_string(),
            attempt: attempts,
        };
        self.complete(&outcome, started.elapsed(), attempts);
        ResilienceError::Cancelled {
            endpoint: endpoint.to_string(),
            correlation_id: correlation_id.to_string(),
        }
    }

    fn complete(&self, outcome: &CallOutcome, duration: Duration, attempts: u32) {
        self.telemetry.emit(TelemetryEvent::ApiCall(ApiCallEvent {
            endpoint: outcome.endpoint.clone(),
            method: outcome.method.clone(),
            duration,
            success: outcome.success,
            status_code: outcome.status_code,
            category: outcome.category,
            correlation_id: outcome.correlation_id.clone(),
            attempts,
            timestamp: Utc::now(),
        }));
    }
}

/// Builder for [`ResilientInvoker`]
#[derive(Debug, Clone, Default)]
pub struct ResilientInvokerBuilder {
    circuit_breaker: CircuitBreakerConfig,
    scope: BreakerScope,
    retry: RetryConfig,
    telemetry: TelemetryDispatcher,
    config: InvokerConfig,
}

impl ResilientInvokerBuilder {
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    pub fn breaker_scope(mut self, scope: BreakerScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn telemetry(mut self, telemetry: TelemetryDispatcher) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.attempt_timeout = timeout;
        self
    }

    pub fn correlation_max_len(mut self, max_len: usize) -> Self {
        self.config.correlation_max_len = max_len;
        self
    }

    pub fn build(self) -> Result<ResilientInvoker, ResilienceError> {
        self.circuit_breaker.validate()?;
        self.retry.validate()?;
        if self.config.correlation_max_len == 0 {
            return Err(ResilienceError::InvalidConfig(
                "correlation_max_len must be > 0".to_string(),
            ));
        }

        Ok(ResilientInvoker {
            breakers: CircuitBreakerRegistry::new(
                self.circuit_breaker,
                self.scope,
                self.telemetry.clone(),
            ),
            retry: RetryPolicy::new(self.retry),
            telemetry: self.telemetry,
            config: self.config,
        })
    }
}
