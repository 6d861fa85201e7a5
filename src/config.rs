/*!
 * Configuration types for Storelink
 *
 * Durations are expressed in milliseconds. A value of 0 disables the
 * optional limits (per-attempt timeout, window horizon).
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storelink_core_resilience::{
    BreakerScope, CircuitBreakerConfig, ErrorCategory, RetryConfig, TelemetryConfig,
};

use crate::error::{Result, StorelinkError};

/// Main configuration for the storefront client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorelinkConfig {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub circuit_breaker: BreakerSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub correlation: CorrelationSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transport settings for the HTTP downstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Storefront API root; endpoints are resolved against it
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for a single attempt (0 = no limit)
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// One breaker per endpoint, or one for the whole client
    #[serde(default)]
    pub scope: BreakerScope,

    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    #[serde(default = "default_minimum_samples")]
    pub minimum_samples: usize,

    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    /// Outcomes older than this leave the window (0 = count-based only)
    #[serde(default = "default_window_horizon_ms")]
    pub window_horizon_ms: u64,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    #[serde(default = "default_half_open_max_trials")]
    pub half_open_max_trials: usize,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            scope: BreakerScope::default(),
            failure_rate_threshold: default_failure_rate_threshold(),
            minimum_samples: default_minimum_samples(),
            window_capacity: default_window_capacity(),
            window_horizon_ms: default_window_horizon_ms(),
            cooldown_ms: default_cooldown_ms(),
            half_open_max_trials: default_half_open_max_trials(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_retryable")]
    pub retryable: Vec<ErrorCategory>,

    #[serde(default = "default_true")]
    pub honor_retry_after: bool,

    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            retryable: default_retryable(),
            honor_retry_after: true,
            jitter_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSettings {
    /// Caller-supplied ids longer than this are truncated
    #[serde(default = "default_correlation_max_len")]
    pub max_len: usize,

    /// Request header carrying the id to the storefront
    #[serde(default = "default_correlation_header")]
    pub header: String,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            max_len: default_correlation_max_len(),
            header: default_correlation_header(),
        }
    }
}

/// Where telemetry events go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetrySinkKind {
    /// Telemetry disabled
    #[default]
    None,
    /// Structured `tracing` events
    Tracing,
    /// JSON lines on stdout
    Stdout,
    /// JSON lines on stderr
    Stderr,
    /// JSON lines appended to `path`
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub sink: TelemetrySinkKind,

    /// Output file for the `file` sink
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_sink_timeout_ms")]
    pub sink_timeout_ms: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            sink: TelemetrySinkKind::default(),
            path: None,
            queue_capacity: default_queue_capacity(),
            sink_timeout_ms: default_sink_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Shorthand for level = debug
    #[serde(default)]
    pub verbose: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_attempt_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_user_agent() -> String {
    format!("storelink/{}", env!("CARGO_PKG_VERSION"))
}

fn default_failure_rate_threshold() -> f64 {
    0.5
}

fn default_minimum_samples() -> usize {
    10
}

fn default_window_capacity() -> usize {
    20
}

fn default_window_horizon_ms() -> u64 {
    60_000
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_half_open_max_trials() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_retryable() -> Vec<ErrorCategory> {
    storelink_core_resilience::retry::default_retryable()
        .into_iter()
        .collect()
}

fn default_correlation_max_len() -> usize {
    storelink_core_resilience::correlation::DEFAULT_MAX_LEN
}

fn default_correlation_header() -> String {
    "X-Correlation-ID".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_sink_timeout_ms() -> u64 {
    2_000
}

fn millis_or_none(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl StorelinkConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: StorelinkConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Load `path` when given, otherwise the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Check every section, including the engine's own limits
    pub fn validate(&self) -> Result<()> {
        let base = reqwest::Url::parse(&self.http.base_url).map_err(|e| {
            StorelinkError::Config(format!("invalid http.base_url '{}': {}", self.http.base_url, e))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(StorelinkError::Config(format!(
                "http.base_url must use http or https, got '{}'",
                base.scheme()
            )));
        }
        if self.correlation.max_len == 0 {
            return Err(StorelinkError::Config(
                "correlation.max_len must be > 0".to_string(),
            ));
        }
        if reqwest::header::HeaderName::from_bytes(self.correlation.header.as_bytes()).is_err() {
            return Err(StorelinkError::Config(format!(
                "correlation.header '{}' is not a valid header name",
                self.correlation.header
            )));
        }
        if self.telemetry.sink == TelemetrySinkKind::File && self.telemetry.path.is_none() {
            return Err(StorelinkError::Config(
                "telemetry.path is required when telemetry.sink = \"file\"".to_string(),
            ));
        }

        self.breaker_config().validate()?;
        self.retry_config().validate()?;
        Ok(())
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        let settings = &self.circuit_breaker;
        CircuitBreakerConfig {
            failure_rate_threshold: settings.failure_rate_threshold,
            minimum_samples: settings.minimum_samples,
            window_capacity: settings.window_capacity,
            window_horizon: millis_or_none(settings.window_horizon_ms),
            cooldown: Duration::from_millis(settings.cooldown_ms),
            half_open_max_trials: settings.half_open_max_trials,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        let settings = &self.retry;
        RetryConfig {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            multiplier: settings.multiplier,
            max_delay: Duration::from_millis(settings.max_delay_ms),
            retryable: settings.retryable.iter().copied().collect(),
            honor_retry_after: settings.honor_retry_after,
            jitter_factor: settings.jitter_factor,
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            queue_capacity: self.telemetry.queue_capacity,
            sink_timeout: Duration::from_millis(self.telemetry.sink_timeout_ms),
        }
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        millis_or_none(self.http.attempt_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = StorelinkConfig::default();
        assert_eq!(config.http.base_url, "http://localhost:8080");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.correlation.max_len, 36);
        assert_eq!(config.telemetry.sink, TelemetrySinkKind::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_conversions() {
        let config = StorelinkConfig::default();

        let breaker = config.breaker_config();
        assert_eq!(breaker.window_horizon, Some(Duration::from_secs(60)));
        assert_eq!(breaker.cooldown, Duration::from_secs(30));

        let retry = config.retry_config();
        assert_eq!(retry.base_delay, Duration::from_millis(100));
        assert!(retry.retryable.contains(&ErrorCategory::RateLimit));
        assert!(!retry.retryable.contains(&ErrorCategory::Timeout));

        assert_eq!(config.attempt_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_disables_limits() {
        let mut config = StorelinkConfig::default();
        config.http.attempt_timeout_ms = 0;
        config.circuit_breaker.window_horizon_ms = 0;
        assert_eq!(config.attempt_timeout(), None);
        assert_eq!(config.breaker_config().window_horizon, None);
    }

    #[test]
    fn test_partial_toml() {
        let toml_str = r#"
[http]
base_url = "https://shop.example.com/api/v2"

[circuit_breaker]
scope = "global"
minimum_samples = 4
cooldown_ms = 1000

[retry]
max_attempts = 5
retryable = ["transient", "network", "timeout"]

[telemetry]
sink = "tracing"

[logging]
level = "debug"
"#;
        let config: StorelinkConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.http.base_url, "https://shop.example.com/api/v2");
        assert_eq!(config.http.attempt_timeout_ms, 30_000);
        assert_eq!(config.circuit_breaker.scope, BreakerScope::Global);
        assert_eq!(config.circuit_breaker.minimum_samples, 4);
        assert_eq!(config.circuit_breaker.window_capacity, 20);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(
            config.retry.retryable,
            vec![
                ErrorCategory::Transient,
                ErrorCategory::Network,
                ErrorCategory::Timeout
            ]
        );
        assert_eq!(config.telemetry.sink, TelemetrySinkKind::Tracing);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let mut config = StorelinkConfig::default();
        config.retry.jitter_factor = 0.25;
        config.telemetry.sink = TelemetrySinkKind::File;
        config.telemetry.path = Some(PathBuf::from("/var/log/storelink/events.jsonl"));

        let file = NamedTempFile::new().unwrap();
        config.to_file(file.path()).unwrap();
        let loaded = StorelinkConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = StorelinkConfig::default();
        config.http.base_url = "ftp://shop.example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = StorelinkConfig::default();
        config.telemetry.sink = TelemetrySinkKind::File;
        assert!(config.validate().is_err());

        let mut config = StorelinkConfig::default();
        config.circuit_breaker.minimum_samples = 50;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StorelinkError::Resilience(_)));

        let mut config = StorelinkConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = StorelinkConfig::default();
        config.correlation.header = "bad header".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_reported() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "[retry]\nmax_attempts = \"three\"\n").unwrap();
        let err = StorelinkConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, StorelinkError::TomlParse(_)));
    }
}
