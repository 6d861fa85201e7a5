//! Telemetry side channel
//!
//! The engine reports three kinds of events: retries, circuit transitions and
//! completed logical calls. Sinks are external collaborators (a database, a log
//! shipper, a test recorder) behind the [`TelemetrySink`] trait.
//!
//! Delivery is best effort. [`TelemetryDispatcher`] pushes events onto a
//! bounded queue with `try_send`, so the invocation path never waits on a sink.
//! A single worker task drains the queue in order and calls the sink with a
//! timeout; sink errors, panics and timeouts are logged and discarded. When the
//! queue is full, events are dropped and counted.

use crate::circuit_breaker::CircuitState;
use crate::error::{ErrorCategory, TelemetryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// A retry was scheduled after a failed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryEvent {
    pub endpoint: String,
    pub method: String,
    /// The attempt that failed (1-based)
    pub attempt: u32,
    /// Delay before the next attempt
    #[serde(rename = "delay_ms", with = "duration_ms")]
    pub delay: Duration,
    pub status_code: Option<u16>,
    pub category: ErrorCategory,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A breaker changed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitTransitionEvent {
    /// Breaker key (the endpoint, or the global key)
    pub endpoint: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: String,
    pub failure_rate: f64,
    pub sample_count: usize,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A logical call finished, successfully or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallEvent {
    pub endpoint: String,
    pub method: String,
    /// Wall-clock duration of the whole logical call
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    pub success: bool,
    pub status_code: Option<u16>,
    pub category: ErrorCategory,
    pub correlation_id: String,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

/// Any event produced by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Retry(RetryEvent),
    CircuitTransition(CircuitTransitionEvent),
    ApiCall(ApiCallEvent),
}

impl TelemetryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::Retry(_) => "retry",
            TelemetryEvent::CircuitTransition(_) => "circuit_transition",
            TelemetryEvent::ApiCall(_) => "api_call",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            TelemetryEvent::Retry(e) => &e.correlation_id,
            TelemetryEvent::CircuitTransition(e) => &e.correlation_id,
            TelemetryEvent::ApiCall(e) => &e.correlation_id,
        }
    }
}

/// Receiver of engine events
///
/// Implementations may fail; the engine never inspects the result beyond
/// logging it.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn on_retry(&self, event: &RetryEvent) -> Result<(), TelemetryError>;

    async fn on_circuit_transition(
        &self,
        event: &CircuitTransitionEvent,
    ) -> Result<(), TelemetryError>;

    async fn on_api_call(&self, event: &ApiCallEvent) -> Result<(), TelemetryError>;
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetrySink;

#[async_trait]
impl TelemetrySink for NoopTelemetrySink {
    async fn on_retry(&self, _event: &RetryEvent) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn on_circuit_transition(
        &self,
        _event: &CircuitTransitionEvent,
    ) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn on_api_call(&self, _event: &ApiCallEvent) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Sink that keeps every event in memory, in delivery order
#[derive(Debug, Default)]
pub struct MemoryTelemetrySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    /// Snapshot of all events received so far
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn retries(&self) -> Vec<RetryEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TelemetryEvent::Retry(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn transitions(&self) -> Vec<CircuitTransitionEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TelemetryEvent::CircuitTransition(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn api_calls(&self) -> Vec<ApiCallEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TelemetryEvent::ApiCall(e) => Some(e),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetrySink {
    async fn on_retry(&self, event: &RetryEvent) -> Result<(), TelemetryError> {
        self.push(TelemetryEvent::Retry(event.clone()));
        Ok(())
    }

    async fn on_circuit_transition(
        &self,
        event: &CircuitTransitionEvent,
    ) -> Result<(), TelemetryError> {
        self.push(TelemetryEvent::CircuitTransition(event.clone()));
        Ok(())
    }

    async fn on_api_call(&self, event: &ApiCallEvent) -> Result<(), TelemetryError> {
        self.push(TelemetryEvent::ApiCall(event.clone()));
        Ok(())
    }
}

/// Configuration for the telemetry dispatcher
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Events buffered before new ones are dropped
    pub queue_capacity: usize,
    /// Longest a single sink call may take before it is abandoned
    pub sink_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            sink_timeout: Duration::from_secs(2),
        }
    }
}

enum Dispatch {
    Event(TelemetryEvent),
    Flush(oneshot::Sender<()>),
}

struct DispatchInner {
    tx: mpsc::Sender<Dispatch>,
    dropped: AtomicU64,
}

/// Non-blocking handle for emitting events to a sink
///
/// Cloning is cheap; all clones feed the same worker. The default dispatcher
/// is disabled and drops every event without spawning anything.
#[derive(Clone, Default)]
pub struct TelemetryDispatcher {
    inner: Option<Arc<DispatchInner>>,
}

impl fmt::Debug for TelemetryDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryDispatcher")
            .field("enabled", &self.is_enabled())
            .field("dropped", &self.dropped_events())
            .finish()
    }
}

impl TelemetryDispatcher {
    /// Dispatcher that drops every event
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Spawn a worker delivering to `sink`. Must be called within a tokio runtime.
    pub fn spawn(sink: Arc<dyn TelemetrySink>, config: TelemetryConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        tokio::spawn(run_worker(sink, rx, config.sink_timeout));
        Self {
            inner: Some(Arc::new(DispatchInner {
                tx,
                dropped: AtomicU64::new(0),
            })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Queue an event without waiting
    pub fn emit(&self, event: TelemetryEvent) {
        let Some(inner) = &self.inner else {
            return;
        };
        if let Err(err) = inner.tx.try_send(Dispatch::Event(event)) {
            inner.dropped.fetch_add(1, Ordering::Relaxed);
            let kind = match &err {
                mpsc::error::TrySendError::Full(Dispatch::Event(e))
                | mpsc::error::TrySendError::Closed(Dispatch::Event(e)) => e.kind(),
                _ => "flush",
            };
            debug!(kind, "telemetry queue unavailable, event dropped");
        }
    }

    /// Events dropped because the queue was full or the worker had stopped
    pub fn dropped_events(&self) -> u64 {
        self.inner
            .as_ref()
            .map(|inner| inner.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Wait until every event queued before this call has been delivered
    pub async fn flush(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if inner.tx.send(Dispatch::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn run_worker(
    sink: Arc<dyn TelemetrySink>,
    mut rx: mpsc::Receiver<Dispatch>,
    sink_timeout: Duration,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Dispatch::Event(event) => deliver(sink.as_ref(), &event, sink_timeout).await,
            Dispatch::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("telemetry worker stopped");
}

async fn deliver(sink: &dyn TelemetrySink, event: &TelemetryEvent, sink_timeout: Duration) {
    let call = async {
        match event {
            TelemetryEvent::Retry(e) => sink.on_retry(e).await,
            TelemetryEvent::CircuitTransition(e) => sink.on_circuit_transition(e).await,
            TelemetryEvent::ApiCall(e) => sink.on_api_call(e).await,
        }
    };

    match tokio::time::timeout(sink_timeout, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => warn!(
            kind = event.kind(),
            correlation_id = event.correlation_id(),
            error = %err,
            "telemetry sink failed, event discarded"
        ),
        Ok(Err(_)) => warn!(
            kind = event.kind(),
            correlation_id = event.correlation_id(),
            "telemetry sink panicked, event discarded"
        ),
        Err(_) => warn!(
            kind = event.kind(),
            correlation_id = event.correlation_id(),
            timeout_ms = sink_timeout.as_millis() as u64,
            "telemetry sink timed out, event discarded"
        ),
    }
}

/// Serialize a `Duration` as whole milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_call(correlation_id: &str) -> TelemetryEvent {
        TelemetryEvent::ApiCall(ApiCallEvent {
            endpoint: "/products".to_string(),
            method: "GET".to_string(),
            duration: Duration::from_millis(12),
            success: true,
            status_code: Some(200),
            category: ErrorCategory::None,
            correlation_id: correlation_id.to_string(),
            attempts: 1,
            timestamp: Utc::now(),
        })
    }

    struct FailingSink;

    #[async_trait]
    impl TelemetrySink for FailingSink {
        async fn on_retry(&self, _event: &RetryEvent) -> Result<(), TelemetryError> {
            Err(TelemetryError::Sink("database unavailable".to_string()))
        }

        async fn on_circuit_transition(
            &self,
            _event: &CircuitTransitionEvent,
        ) -> Result<(), TelemetryError> {
            panic!("sink exploded")
        }

        async fn on_api_call(&self, _event: &ApiCallEvent) -> Result<(), TelemetryError> {
            Err(TelemetryError::Sink("database unavailable".to_string()))
        }
    }

    struct SlowSink {
        inner: MemoryTelemetrySink,
    }

    #[async_trait]
    impl TelemetrySink for SlowSink {
        async fn on_retry(&self, event: &RetryEvent) -> Result<(), TelemetryError> {
            self.inner.on_retry(event).await
        }

        async fn on_circuit_transition(
            &self,
            event: &CircuitTransitionEvent,
        ) -> Result<(), TelemetryError> {
            self.inner.on_circuit_transition(event).await
        }

        async fn on_api_call(&self, event: &ApiCallEvent) -> Result<(), TelemetryError> {
            if event.correlation_id == "slow" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.inner.on_api_call(event).await
        }
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_is_noop() {
        let dispatcher = TelemetryDispatcher::default();
        assert!(!dispatcher.is_enabled());
        dispatcher.emit(api_call("a"));
        dispatcher.flush().await;
        assert_eq!(dispatcher.dropped_events(), 0);
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let sink = Arc::new(MemoryTelemetrySink::new());
        let dispatcher = TelemetryDispatcher::spawn(sink.clone(), TelemetryConfig::default());

        for i in 0..10 {
            dispatcher.emit(api_call(&format!("id-{}", i)));
        }
        dispatcher.flush().await;

        let ids: Vec<String> = sink
            .api_calls()
            .into_iter()
            .map(|e| e.correlation_id)
            .collect();
        let expected: Vec<String> = (0..10).map(|i| format!("id-{}", i)).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_sink_failures_are_contained() {
        let dispatcher =
            TelemetryDispatcher::spawn(Arc::new(FailingSink), TelemetryConfig::default());

        dispatcher.emit(api_call("a"));
        dispatcher.emit(TelemetryEvent::CircuitTransition(CircuitTransitionEvent {
            endpoint: "/products".to_string(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
            reason: "test".to_string(),
            failure_rate: 1.0,
            sample_count: 4,
            correlation_id: "b".to_string(),
            timestamp: Utc::now(),
        }));
        dispatcher.emit(api_call("c"));

        // The worker survives both the error and the panic
        dispatcher.flush().await;
        assert_eq!(dispatcher.dropped_events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sink_times_out() {
        let sink = Arc::new(SlowSink {
            inner: MemoryTelemetrySink::new(),
        });
        let dispatcher = TelemetryDispatcher::spawn(
            sink.clone(),
            TelemetryConfig {
                queue_capacity: 8,
                sink_timeout: Duration::from_millis(100),
            },
        );

        dispatcher.emit(api_call("slow"));
        dispatcher.emit(api_call("fast"));
        dispatcher.flush().await;

        let ids: Vec<String> = sink
            .inner
            .api_calls()
            .into_iter()
            .map(|e| e.correlation_id)
            .collect();
        assert_eq!(ids, vec!["fast".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_events() {
        let sink = Arc::new(SlowSink {
            inner: MemoryTelemetrySink::new(),
        });
        let dispatcher = TelemetryDispatcher::spawn(
            sink,
            TelemetryConfig {
                queue_capacity: 1,
                sink_timeout: Duration::from_secs(120),
            },
        );

        // The worker picks up the first event and blocks on it
        dispatcher.emit(api_call("slow"));
        tokio::task::yield_now().await;
        dispatcher.emit(api_call("queued"));
        dispatcher.emit(api_call("dropped"));

        assert_eq!(dispatcher.dropped_events(), 1);
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(api_call("abc")).unwrap();
        assert_eq!(json["type"], "api_call");
        assert_eq!(json["duration_ms"], 12);
        assert_eq!(json["category"], "none");
        assert_eq!(json["correlation_id"], "abc");
    }
}
