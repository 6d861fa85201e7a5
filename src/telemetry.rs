/*!
 * Telemetry sinks for engine events
 *
 * Two sinks ship with the client: one that turns events into structured
 * `tracing` events, and one that writes JSON lines for monitoring, audit
 * trails and integration with external systems.
 */

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use storelink_core_resilience::telemetry::{ApiCallEvent, CircuitTransitionEvent, RetryEvent};
use storelink_core_resilience::{TelemetryError, TelemetryEvent, TelemetrySink};
use tracing::{info, warn};

use crate::config::{TelemetrySettings, TelemetrySinkKind};
use crate::error::{Result, StorelinkError};

/// Sink that reports events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

#[async_trait]
impl TelemetrySink for TracingTelemetrySink {
    async fn on_retry(&self, event: &RetryEvent) -> std::result::Result<(), TelemetryError> {
        info!(
            target: "storelink::telemetry",
            endpoint = %event.endpoint,
            method = %event.method,
            attempt = event.attempt,
            delay_ms = event.delay.as_millis() as u64,
            status = ?event.status_code,
            category = %event.category,
            correlation_id = %event.correlation_id,
            "retry scheduled"
        );
        Ok(())
    }

    async fn on_circuit_transition(
        &self,
        event: &CircuitTransitionEvent,
    ) -> std::result::Result<(), TelemetryError> {
        warn!(
            target: "storelink::telemetry",
            endpoint = %event.endpoint,
            from = %event.from,
            to = %event.to,
            failure_rate = event.failure_rate,
            samples = event.sample_count,
            correlation_id = %event.correlation_id,
            "circuit {}: {}",
            event.to,
            event.reason
        );
        Ok(())
    }

    async fn on_api_call(&self, event: &ApiCallEvent) -> std::result::Result<(), TelemetryError> {
        info!(
            target: "storelink::telemetry",
            endpoint = %event.endpoint,
            method = %event.method,
            duration_ms = event.duration.as_millis() as u64,
            success = event.success,
            status = ?event.status_code,
            category = %event.category,
            attempts = event.attempts,
            correlation_id = %event.correlation_id,
            "api call completed"
        );
        Ok(())
    }
}

/// Output destination for JSON telemetry lines
pub enum TelemetryOutput {
    /// Write to stdout
    Stdout,
    /// Write to stderr
    Stderr,
    /// Append to a file
    File(BufWriter<File>),
}

impl TelemetryOutput {
    /// Create file output, appending to an existing file
    pub fn file(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(TelemetryOutput::File(BufWriter::new(file)))
    }

    /// Write a telemetry event as JSON line
    fn write_event(&mut self, event: &TelemetryEvent) -> io::Result<()> {
        let json = serde_json::to_string(event)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        match self {
            TelemetryOutput::Stdout => {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{}", json)?;
                stdout.flush()
            }
            TelemetryOutput::Stderr => {
                let mut stderr = io::stderr().lock();
                writeln!(stderr, "{}", json)?;
                stderr.flush()
            }
            TelemetryOutput::File(writer) => {
                writeln!(writer, "{}", json)?;
                writer.flush()
            }
        }
    }
}

/// Sink writing one JSON object per line
pub struct JsonLinesSink {
    output: Mutex<TelemetryOutput>,
}

impl JsonLinesSink {
    pub fn new(output: TelemetryOutput) -> Self {
        Self {
            output: Mutex::new(output),
        }
    }

    pub fn stdout() -> Self {
        Self::new(TelemetryOutput::Stdout)
    }

    pub fn file(path: &Path) -> io::Result<Self> {
        Ok(Self::new(TelemetryOutput::file(path)?))
    }

    fn write(&self, event: TelemetryEvent) -> std::result::Result<(), TelemetryError> {
        let mut output = self
            .output
            .lock()
            .map_err(|_| TelemetryError::Sink("telemetry output lock poisoned".to_string()))?;
        output.write_event(&event)?;
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for JsonLinesSink {
    async fn on_retry(&self, event: &RetryEvent) -> std::result::Result<(), TelemetryError> {
        self.write(TelemetryEvent::Retry(event.clone()))
    }

    async fn on_circuit_transition(
        &self,
        event: &CircuitTransitionEvent,
    ) -> std::result::Result<(), TelemetryError> {
        self.write(TelemetryEvent::CircuitTransition(event.clone()))
    }

    async fn on_api_call(&self, event: &ApiCallEvent) -> std::result::Result<(), TelemetryError> {
        self.write(TelemetryEvent::ApiCall(event.clone()))
    }
}

/// Build the sink selected by `settings`; `None` when telemetry is disabled
pub fn build_sink(settings: &TelemetrySettings) -> Result<Option<Arc<dyn TelemetrySink>>> {
    let sink: Arc<dyn TelemetrySink> = match settings.sink {
        TelemetrySinkKind::None => return Ok(None),
        TelemetrySinkKind::Tracing => Arc::new(TracingTelemetrySink),
        TelemetrySinkKind::Stdout => Arc::new(JsonLinesSink::stdout()),
        TelemetrySinkKind::Stderr => Arc::new(JsonLinesSink::new(TelemetryOutput::Stderr)),
        TelemetrySinkKind::File => {
            let path = settings.path.as_deref().ok_or_else(|| {
                StorelinkError::Config("telemetry.path is required for the file sink".to_string())
            })?;
            Arc::new(JsonLinesSink::file(path)?)
        }
    };
    Ok(Some(sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use storelink_core_resilience::{CircuitState, ErrorCategory};
    use tempfile::TempDir;

    fn api_call(correlation_id: &str) -> ApiCallEvent {
        ApiCallEvent {
            endpoint: "/products".to_string(),
            method: "GET".to_string(),
            duration: Duration::from_millis(42),
            success: true,
            status_code: Some(200),
            category: ErrorCategory::None,
            correlation_id: correlation_id.to_string(),
            attempts: 1,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_json_lines_file_sink() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = JsonLinesSink::file(&path).unwrap();

        sink.on_api_call(&api_call("req-1")).await.unwrap();
        sink.on_circuit_transition(&CircuitTransitionEvent {
            endpoint: "/products".to_string(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
            reason: "failure threshold exceeded at rate 0.75".to_string(),
            failure_rate: 0.75,
            sample_count: 4,
            correlation_id: "req-2".to_string(),
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "api_call");
        assert_eq!(lines[0]["duration_ms"], 42);
        assert_eq!(lines[0]["correlation_id"], "req-1");
        assert_eq!(lines[1]["type"], "circuit_transition");
        assert_eq!(lines[1]["to"], "open");
        assert_eq!(lines[1]["sample_count"], 4);
    }

    #[tokio::test]
    async fn test_file_sink_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");

        JsonLinesSink::file(&path)
            .unwrap()
            .on_api_call(&api_call("first"))
            .await
            .unwrap();
        JsonLinesSink::file(&path)
            .unwrap()
            .on_api_call(&api_call("second"))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let sink = TracingTelemetrySink;
        assert!(sink.on_api_call(&api_call("req-3")).await.is_ok());
    }

    #[test]
    fn test_build_sink() {
        let disabled = TelemetrySettings::default();
        assert!(build_sink(&disabled).unwrap().is_none());

        let tracing = TelemetrySettings {
            sink: TelemetrySinkKind::Tracing,
            ..Default::default()
        };
        assert!(build_sink(&tracing).unwrap().is_some());

        let missing_path = TelemetrySettings {
            sink: TelemetrySinkKind::File,
            ..Default::default()
        };
        assert!(build_sink(&missing_path).is_err());
    }
}
