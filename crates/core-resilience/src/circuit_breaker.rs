//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a service
//! is experiencing issues. It has three states:
//! - Closed: Normal operation, requests pass through and outcomes feed a sliding window
//! - Open: Service is unhealthy, requests fail immediately until the cool-down elapses
//! - HalfOpen: A limited number of trial calls probe whether the service recovered
//!
//! State and window sit behind one mutex per breaker, so a window update and
//! the transition it causes are observed atomically. Every transition is
//! reported to the telemetry dispatcher after the lock is released.

use crate::error::{ErrorCategory, ResilienceError};
use crate::telemetry::{CircuitTransitionEvent, TelemetryDispatcher, TelemetryEvent};
use crate::window::FailureWindow;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately
    Open,
    /// Circuit is half-open, testing service recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure rate (0.0 - 1.0) at or above which the circuit opens
    pub failure_rate_threshold: f64,
    /// Samples required in the window before the rate is evaluated
    pub minimum_samples: usize,
    /// Maximum outcomes kept in the window
    pub window_capacity: usize,
    /// Outcomes older than this are evicted, when set
    pub window_horizon: Option<Duration>,
    /// Duration to wait before transitioning from open to half-open
    pub cooldown: Duration,
    /// Concurrent trial calls allowed while half-open
    pub half_open_max_trials: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            minimum_samples: 10,
            window_capacity: 20,
            window_horizon: Some(Duration::from_secs(60)),
            cooldown: Duration::from_secs(30),
            half_open_max_trials: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 1.0) {
            return Err(ResilienceError::InvalidConfig(format!(
                "failure_rate_threshold must be in (0, 1], got {}",
                self.failure_rate_threshold
            )));
        }
        if self.minimum_samples == 0 {
            return Err(ResilienceError::InvalidConfig(
                "minimum_samples must be > 0".to_string(),
            ));
        }
        if self.minimum_samples > self.window_capacity {
            return Err(ResilienceError::InvalidConfig(format!(
                "minimum_samples ({}) cannot exceed window_capacity ({})",
                self.minimum_samples, self.window_capacity
            )));
        }
        if self.half_open_max_trials == 0 {
            return Err(ResilienceError::InvalidConfig(
                "half_open_max_trials must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub failure_rate: f64,
    pub sample_count: usize,
    pub failures: usize,
    /// Time left before an open circuit admits a trial call
    pub open_remaining: Option<Duration>,
    pub trials_in_flight: usize,
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    window: FailureWindow,
    opened_at: Option<Instant>,
    trials_in_flight: usize,
    /// Bumped on every transition; outcomes from an older epoch are ignored
    epoch: u64,
}

struct Transition {
    from: CircuitState,
    to: CircuitState,
    reason: String,
    failure_rate: f64,
    sample_count: usize,
}

impl BreakerState {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            window: FailureWindow::new(config.window_capacity, config.window_horizon),
            opened_at: None,
            trials_in_flight: 0,
            epoch: 0,
        }
    }

    fn transition(&mut self, to: CircuitState, reason: String, now: Instant) -> Transition {
        let record = Transition {
            from: self.state,
            to,
            reason,
            failure_rate: self.window.failure_rate(),
            sample_count: self.window.len(),
        };

        self.state = to;
        self.epoch += 1;
        self.trials_in_flight = 0;
        self.opened_at = match to {
            CircuitState::Open => Some(now),
            _ => None,
        };
        if to == CircuitState::Closed {
            self.window.clear();
        }
        record
    }
}

/// Circuit breaker for protecting against cascading failures
///
/// # Example
/// ```
/// use storelink_core_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
///
/// let breaker = CircuitBreaker::new("/products", CircuitBreakerConfig::default());
/// let permit = breaker.try_acquire("req-1").unwrap();
/// permit.record_success();
/// assert_eq!(breaker.state(), CircuitState::Closed);
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    key: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<BreakerState>>,
    telemetry: TelemetryDispatcher,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let state = BreakerState::new(&config);
        Self {
            key: Arc::from(key.into()),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
            telemetry: TelemetryDispatcher::disabled(),
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default(key: impl Into<String>) -> Self {
        Self::new(key, CircuitBreakerConfig::default())
    }

    /// Report transitions to `telemetry`
    pub fn with_telemetry(mut self, telemetry: TelemetryDispatcher) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // Critical sections never panic midway, so a poisoned lock still holds a consistent state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state, without triggering the open -> half-open check
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = Instant::now();
        let mut state = self.lock();
        state.window.evict(now);
        let open_remaining = state.opened_at.map(|opened| {
            (opened + self.config.cooldown).saturating_duration_since(now)
        });
        CircuitSnapshot {
            key: self.key.to_string(),
            state: state.state,
            failure_rate: state.window.failure_rate(),
            sample_count: state.window.len(),
            failures: state.window.failures(),
            open_remaining,
            trials_in_flight: state.trials_in_flight,
        }
    }

    /// Ask for permission to make a call
    ///
    /// An open circuit whose cool-down has elapsed moves to half-open here,
    /// before the caller's request is executed.
    pub fn try_acquire(&self, correlation_id: &str) -> Result<CallPermit, ResilienceError> {
        let now = Instant::now();
        let mut transition = None;

        let decision = {
            let mut state = self.lock();
            match state.state {
                CircuitState::Closed => Ok((state.epoch, false)),
                CircuitState::Open => {
                    let ready = state
                        .opened_at
                        .map(|opened| now >= opened + self.config.cooldown)
                        .unwrap_or(true);
                    if ready {
                        transition = Some(state.transition(
                            CircuitState::HalfOpen,
                            "open timeout elapsed".to_string(),
                            now,
                        ));
                        state.trials_in_flight = 1;
                        Ok((state.epoch, true))
                    } else {
                        Err(())
                    }
                }
                CircuitState::HalfOpen => {
                    if state.trials_in_flight < self.config.half_open_max_trials {
                        state.trials_in_flight += 1;
                        Ok((state.epoch, true))
                    } else {
                        Err(())
                    }
                }
            }
        };

        if let Some(transition) = transition {
            self.publish(transition, correlation_id);
        }

        match decision {
            Ok((epoch, trial)) => Ok(CallPermit {
                breaker: self.clone(),
                epoch,
                trial,
                correlation_id: correlation_id.to_string(),
                settled: false,
            }),
            Err(()) => Err(ResilienceError::CircuitOpen {
                endpoint: self.key.to_string(),
                correlation_id: correlation_id.to_string(),
            }),
        }
    }

    /// Record a success that was not tracked through a permit
    ///
    /// Only a closed breaker accepts permit-less samples. While open or half-open
    /// the outcome is ignored, so trial accounting stays with permit holders.
    pub fn record_success(&self, correlation_id: &str) {
        self.on_result(None, false, false, correlation_id);
    }

    /// Record a failure that was not tracked through a permit; ignored unless closed
    pub fn record_failure(&self, correlation_id: &str) {
        self.on_result(None, false, true, correlation_id);
    }

    /// Reset the circuit breaker to closed state with an empty window
    pub fn reset(&self) {
        let now = Instant::now();
        let transition = {
            let mut state = self.lock();
            if state.state == CircuitState::Closed {
                state.window.clear();
                None
            } else {
                Some(state.transition(CircuitState::Closed, "manual reset".to_string(), now))
            }
        };
        if let Some(transition) = transition {
            let correlation_id = crate::correlation::CorrelationContext::current();
            self.publish(transition, &correlation_id);
        }
    }

    fn on_result(&self, epoch: Option<u64>, trial: bool, failed: bool, correlation_id: &str) {
        let now = Instant::now();
        let transition = {
            let mut state = self.lock();
            match epoch {
                Some(epoch) if epoch != state.epoch => return,
                None if state.state != CircuitState::Closed => return,
                _ => {}
            }
            if trial {
                state.trials_in_flight = state.trials_in_flight.saturating_sub(1);
            }

            match state.state {
                CircuitState::Closed => {
                    state.window.record(!failed, now);
                    let rate = state.window.failure_rate();
                    if state.window.len() >= self.config.minimum_samples
                        && rate >= self.config.failure_rate_threshold
                    {
                        Some(state.transition(
                            CircuitState::Open,
                            format!("failure threshold exceeded at rate {:.2}", rate),
                            now,
                        ))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    if failed {
                        Some(state.transition(
                            CircuitState::Open,
                            "half-open trial failed".to_string(),
                            now,
                        ))
                    } else {
                        Some(state.transition(
                            CircuitState::Closed,
                            "success streak".to_string(),
                            now,
                        ))
                    }
                }
                CircuitState::Open => None,
            }
        };

        if let Some(transition) = transition {
            self.publish(transition, correlation_id);
        }
    }

    fn release_trial(&self, epoch: u64) {
        let mut state = self.lock();
        if state.epoch == epoch {
            state.trials_in_flight = state.trials_in_flight.saturating_sub(1);
        }
    }

    fn publish(&self, transition: Transition, correlation_id: &str) {
        match transition.to {
            CircuitState::Open => warn!(
                endpoint = %self.key,
                from = %transition.from,
                failure_rate = transition.failure_rate,
                samples = transition.sample_count,
                correlation_id,
                "circuit opened: {}",
                transition.reason
            ),
            _ => info!(
                endpoint = %self.key,
                from = %transition.from,
                to = %transition.to,
                correlation_id,
                "circuit transition: {}",
                transition.reason
            ),
        }

        self.telemetry
            .emit(TelemetryEvent::CircuitTransition(CircuitTransitionEvent {
                endpoint: self.key.to_string(),
                from: transition.from,
                to: transition.to,
                reason: transition.reason,
                failure_rate: transition.failure_rate,
                sample_count: transition.sample_count,
                correlation_id: correlation_id.to_string(),
                timestamp: Utc::now(),
            }));
    }
}

/// Permission to make one call through a breaker
///
/// Settle it with [`record`](Self::record). Dropping an unsettled permit
/// frees its half-open trial slot without counting an outcome.
#[derive(Debug)]
pub struct CallPermit {
    breaker: CircuitBreaker,
    epoch: u64,
    trial: bool,
    correlation_id: String,
    settled: bool,
}

impl CallPermit {
    /// Whether this permit is a half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Feed the call's classified outcome back into the breaker
    pub fn record(mut self, category: ErrorCategory) {
        self.settled = true;
        self.breaker.on_result(
            Some(self.epoch),
            self.trial,
            category.trips_breaker(),
            &self.correlation_id,
        );
    }

    pub fn record_success(self) {
        self.record(ErrorCategory::None);
    }

    pub fn record_failure(self) {
        self.record(ErrorCategory::Transient);
    }

    /// Give the permit back without recording an outcome
    pub fn release(mut self) {
        self.settled = true;
        if self.trial {
            self.breaker.release_trial(self.epoch);
        }
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial(self.epoch);
        }
    }
}

/// How calls are grouped onto breakers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerScope {
    /// One breaker per endpoint path, ignoring any query string
    #[default]
    PerEndpoint,
    /// A single breaker for the whole client
    Global,
}

const GLOBAL_KEY: &str = "*";

/// Arena of breakers indexed by endpoint key
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    config: Arc<CircuitBreakerConfig>,
    scope: BreakerScope,
    telemetry: TelemetryDispatcher,
    breakers: Arc<RwLock<HashMap<String, CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(
        config: CircuitBreakerConfig,
        scope: BreakerScope,
        telemetry: TelemetryDispatcher,
    ) -> Self {
        Self {
            config: Arc::new(config),
            scope,
            telemetry,
            breakers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn scope(&self) -> BreakerScope {
        self.scope
    }

    /// Key of the breaker guarding `endpoint`
    ///
    /// Query string and fragment are not part of the key. Breakers are never
    /// evicted, so per-endpoint callers should pass route templates such as
    /// `/products/{id}` rather than concrete resource paths.
    pub fn key_for<'a>(&self, endpoint: &'a str) -> &'a str {
        match self.scope {
            BreakerScope::PerEndpoint => endpoint
                .split(['?', '#'])
                .next()
                .unwrap_or(endpoint),
            BreakerScope::Global => GLOBAL_KEY,
        }
    }

    /// Breaker guarding `endpoint`, created on first use
    pub fn get(&self, endpoint: &str) -> CircuitBreaker {
        let key = self.key_for(endpoint);
        {
            let breakers = self
                .breakers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(breaker) = breakers.get(key) {
                return breaker.clone();
            }
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                CircuitBreaker {
                    key: Arc::from(key),
                    config: self.config.clone(),
                    state: Arc::new(Mutex::new(BreakerState::new(&self.config))),
                    telemetry: self.telemetry.clone(),
                }
            })
            .clone()
    }

    /// Snapshots of every breaker created so far, sorted by key
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let breakers = self
            .breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut snapshots: Vec<_> = breakers.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    pub fn reset_all(&self) {
        let breakers: Vec<CircuitBreaker> = self
            .breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        for breaker in breakers {
            breaker.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_rate_threshold: 0.5,
            minimum_samples: 4,
            window_capacity: 10,
            window_horizon: None,
            cooldown: Duration::from_secs(1),
            half_open_max_trials: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_recover_scenario() {
        let breaker = CircuitBreaker::new("/products", scenario_config());

        breaker.record_failure("c1");
        breaker.record_failure("c1");
        breaker.record_failure("c1");
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_success("c1");

        // 3/4 = 0.75 >= 0.5 once the fourth sample lands
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire("c2").unwrap_err().is_circuit_open());

        tokio::time::advance(Duration::from_secs(1)).await;

        let permit = breaker.try_acquire("c3").unwrap();
        assert!(permit.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        permit.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().sample_count, 0);
    }

    #[test]
    fn test_minimum_samples_respected() {
        let breaker = CircuitBreaker::new("/products", scenario_config());
        for _ in 0..3 {
            breaker.record_failure("c");
        }
        // 100% failure rate but only 3 samples
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure("c");
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("/orders", scenario_config());
        for _ in 0..4 {
            breaker.record_failure("c");
        }
        tokio::time::advance(Duration::from_millis(1001)).await;

        let permit = breaker.try_acquire("trial").unwrap();
        permit.record(ErrorCategory::Network);
        assert_eq!(breaker.state(), CircuitState::Open);

        // Cool-down restarts from the failed trial
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(breaker.try_acquire("c").is_err());
        let remaining = breaker.snapshot().open_remaining.unwrap();
        assert_eq!(remaining, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_limits_trials() {
        let breaker = CircuitBreaker::new("/orders", scenario_config());
        for _ in 0..4 {
            breaker.record_failure("c");
        }
        tokio::time::advance(Duration::from_secs(2)).await;

        let first = breaker.try_acquire("t1").unwrap();
        assert!(breaker.try_acquire("t2").is_err());

        // Dropping an unsettled trial frees the slot
        drop(first);
        let second = breaker.try_acquire("t3").unwrap();
        assert_eq!(breaker.snapshot().trials_in_flight, 1);
        second.release();
        assert_eq!(breaker.snapshot().trials_in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_permit_ignored() {
        let breaker = CircuitBreaker::new("/orders", scenario_config());
        let stale = breaker.try_acquire("old").unwrap();

        for _ in 0..4 {
            breaker.record_failure("c");
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = breaker.try_acquire("trial").unwrap();
        trial.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);

        // Permit from before the trip must not feed the fresh window
        stale.record_failure();
        assert_eq!(breaker.snapshot().sample_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permitless_samples_ignored_while_half_open() {
        let breaker = CircuitBreaker::new("/orders", scenario_config());
        for _ in 0..4 {
            breaker.record_failure("c");
        }
        breaker.record_success("c");
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = breaker.try_acquire("trial").unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Only the trial permit may decide the half-open outcome
        breaker.record_success("stray");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.snapshot().trials_in_flight, 1);

        trial.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_client_errors_count_as_healthy() {
        let breaker = CircuitBreaker::new("/products", scenario_config());
        for _ in 0..4 {
            breaker.try_acquire("c").unwrap().record(ErrorCategory::Validation);
        }
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.sample_count, 4);
        assert_eq!(snapshot.failures, 0);
    }

    #[test]
    fn test_reset() {
        let breaker = CircuitBreaker::new("/products", scenario_config());
        for _ in 0..4 {
            breaker.record_failure("c");
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().sample_count, 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());

        let config = CircuitBreakerConfig {
            minimum_samples: 30,
            window_capacity: 20,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CircuitBreakerConfig {
            failure_rate_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_transitions_reach_telemetry() {
        use crate::telemetry::{MemoryTelemetrySink, TelemetryConfig};

        let sink = Arc::new(MemoryTelemetrySink::new());
        let dispatcher = TelemetryDispatcher::spawn(sink.clone(), TelemetryConfig::default());
        let breaker =
            CircuitBreaker::new("/products", scenario_config()).with_telemetry(dispatcher.clone());

        for _ in 0..3 {
            breaker.record_failure("req-9");
        }
        breaker.record_success("req-9");
        dispatcher.flush().await;

        let transitions = sink.transitions();
        assert_eq!(transitions.len(), 1);
        let event = &transitions[0];
        assert_eq!(event.from, CircuitState::Closed);
        assert_eq!(event.to, CircuitState::Open);
        assert_eq!(event.sample_count, 4);
        assert!((event.failure_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(event.correlation_id, "req-9");
        assert_eq!(event.reason, "failure threshold exceeded at rate 0.75");
    }

    #[test]
    fn test_registry_scoping() {
        let registry = CircuitBreakerRegistry::new(
            scenario_config(),
            BreakerScope::PerEndpoint,
            TelemetryDispatcher::disabled(),
        );
        for _ in 0..4 {
            registry.get("/products").record_failure("c");
        }
        assert_eq!(registry.get("/products").state(), CircuitState::Open);
        assert_eq!(registry.get("/categories").state(), CircuitState::Closed);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.key_for("/products?page=2#top"), "/products");
        assert_eq!(registry.get("/products?page=3").state(), CircuitState::Open);
        assert_eq!(registry.len(), 2);

        let global = CircuitBreakerRegistry::new(
            scenario_config(),
            BreakerScope::Global,
            TelemetryDispatcher::disabled(),
        );
        for _ in 0..4 {
            global.get("/products").record_failure("c");
        }
        assert_eq!(global.get("/suppliers").state(), CircuitState::Open);
        assert_eq!(global.len(), 1);

        global.reset_all();
        assert_eq!(global.get("/suppliers").state(), CircuitState::Closed);
    }
}
