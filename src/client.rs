/*!
 * Storefront client
 *
 * Wires a `StorelinkConfig` into the resilience engine: the HTTP downstream,
 * the telemetry sink and dispatcher, the breaker registry and the retry
 * policy. Must be constructed inside a tokio runtime when telemetry is on.
 */

use std::sync::Arc;
use storelink_core_resilience::{
    CallRequest, CircuitSnapshot, Downstream, Invocation, ResilientInvoker, TelemetryDispatcher,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::StorelinkConfig;
use crate::error::Result;
use crate::http::HttpDownstream;
use crate::telemetry::build_sink;

pub struct StorefrontClient<D: Downstream = HttpDownstream> {
    downstream: Arc<D>,
    invoker: ResilientInvoker,
    shutdown: CancellationToken,
}

impl StorefrontClient<HttpDownstream> {
    /// Client talking HTTP to `config.http.base_url`
    pub fn from_config(config: &StorelinkConfig) -> Result<Self> {
        let downstream = HttpDownstream::new(&config.http, &config.correlation)?;
        Self::with_downstream(config, downstream)
    }
}

impl<D: Downstream> StorefrontClient<D> {
    /// Client over an arbitrary downstream, configured from `config`
    pub fn with_downstream(config: &StorelinkConfig, downstream: D) -> Result<Self> {
        config.validate()?;

        let telemetry = match build_sink(&config.telemetry)? {
            Some(sink) => TelemetryDispatcher::spawn(sink, config.telemetry_config()),
            None => TelemetryDispatcher::disabled(),
        };

        let invoker = ResilientInvoker::builder()
            .circuit_breaker(config.breaker_config())
            .breaker_scope(config.circuit_breaker.scope)
            .retry(config.retry_config())
            .telemetry(telemetry)
            .attempt_timeout(config.attempt_timeout())
            .correlation_max_len(config.correlation.max_len)
            .build()?;

        debug!(
            scope = ?config.circuit_breaker.scope,
            sink = ?config.telemetry.sink,
            "storefront client ready"
        );

        Ok(Self {
            downstream: Arc::new(downstream),
            invoker,
            shutdown: CancellationToken::new(),
        })
    }

    /// Make one logical call
    ///
    /// Without `correlation_id` the ambient id is used, or a fresh one when
    /// the caller has none.
    pub async fn call(
        &self,
        method: &str,
        endpoint: &str,
        correlation_id: Option<&str>,
    ) -> Result<Invocation> {
        let mut request = CallRequest::new(method, endpoint);
        if let Some(id) = correlation_id {
            request = request.with_correlation_id(id);
        }
        let cancel = self.shutdown.child_token();
        let invocation = self
            .invoker
            .invoke(self.downstream.as_ref(), &request, &cancel)
            .await?;
        Ok(invocation)
    }

    pub async fn get(&self, endpoint: &str) -> Result<Invocation> {
        self.call("GET", endpoint, None).await
    }

    pub fn invoker(&self) -> &ResilientInvoker {
        &self.invoker
    }

    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    /// Breaker state for every endpoint called so far
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        self.invoker.breakers().snapshots()
    }

    /// Cancel every in-flight call and refuse new ones
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for queued telemetry to reach the sink
    pub async fn flush_telemetry(&self) {
        self.invoker.telemetry().flush().await;
    }
}
