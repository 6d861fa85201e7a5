/*!
 * Storelink - resilient storefront API integration
 *
 * A storefront API client built on `storelink-core-resilience`:
 * - Error classification of every response and transport failure
 * - Retries with exponential backoff, honoring `Retry-After`
 * - Per-endpoint circuit breakers with half-open recovery
 * - Correlation ids propagated to the storefront in a request header
 * - Telemetry to `tracing` or JSON lines
 * - TOML configuration and structured logging
 */

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod telemetry;

// Re-export commonly used types
pub use client::StorefrontClient;
pub use config::{LogLevel, StorelinkConfig, TelemetrySinkKind};
pub use error::{Result, StorelinkError};
pub use http::HttpDownstream;
pub use telemetry::{JsonLinesSink, TracingTelemetrySink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
