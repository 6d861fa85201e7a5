/*!
 * HTTP transport for storefront calls
 *
 * `HttpDownstream` sends one request per attempt with reqwest. It reports
 * every response the storefront produced as `Ok`, whatever its status, and
 * leaves classification and retries to the engine.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, RETRY_AFTER};
use reqwest::{Client, Method, Url};
use std::time::Duration;
use storelink_core_resilience::{
    CallError, CallErrorKind, CallResponse, CorrelationContext, Downstream,
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::{CorrelationSettings, HttpConfig};
use crate::error::{Result, StorelinkError};

#[derive(Debug, Clone)]
pub struct HttpDownstream {
    client: Client,
    base_url: Url,
    correlation_header: HeaderName,
}

impl HttpDownstream {
    pub fn new(http: &HttpConfig, correlation: &CorrelationSettings) -> Result<Self> {
        let base_url = Url::parse(&http.base_url).map_err(|e| {
            StorelinkError::Config(format!("invalid http.base_url '{}': {}", http.base_url, e))
        })?;
        let correlation_header = HeaderName::from_bytes(correlation.header.as_bytes())
            .map_err(|e| {
                StorelinkError::Config(format!(
                    "invalid correlation.header '{}': {}",
                    correlation.header, e
                ))
            })?;

        // Per-attempt timeouts are enforced by the invoker
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(http.connect_timeout_ms.max(1)))
            .user_agent(http.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url,
            correlation_header,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for `endpoint`; absolute endpoints are used as-is
    pub fn url_for(&self, endpoint: &str) -> std::result::Result<Url, CallError> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Url::parse(endpoint)
                .map_err(|e| CallError::other(format!("invalid endpoint '{}': {}", endpoint, e)));
        }

        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| CallError::other(format!("invalid endpoint '{}': {}", endpoint, e)))
    }
}

#[async_trait]
impl Downstream for HttpDownstream {
    async fn call(
        &self,
        endpoint: &str,
        method: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<CallResponse, CallError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| CallError::other(format!("invalid HTTP method '{}'", method)))?;
        let url = self.url_for(endpoint)?;
        let correlation_id = CorrelationContext::current();

        trace!(%method, %url, %correlation_id, "sending request");
        let request = self
            .client
            .request(method, url)
            .header(self.correlation_header.clone(), correlation_id)
            .send();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CallError::cancelled()),
            result = request => match result {
                Ok(response) => Ok(CallResponse {
                    status: response.status().as_u16(),
                    retry_after: parse_retry_after(response.headers(), Utc::now()),
                }),
                Err(err) => Err(map_error(&err)),
            },
        }
    }
}

fn map_error(err: &reqwest::Error) -> CallError {
    if err.is_timeout() {
        CallError::new(CallErrorKind::TimedOut, err.to_string())
    } else if err.is_connect() {
        CallError::connect(err.to_string())
    } else {
        CallError::other(err.to_string())
    }
}

/// `Retry-After` as delta-seconds or an HTTP date
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn downstream(base_url: &str) -> HttpDownstream {
        let http = HttpConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        };
        HttpDownstream::new(&http, &CorrelationSettings::default()).unwrap()
    }

    /// Serve one canned response and hand back the raw request
    async fn serve_once(response: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
        });

        (format!("http://{}", addr), rx)
    }

    #[test]
    fn test_url_for() {
        let downstream = downstream("https://shop.example.com/api/v2/");
        assert_eq!(
            downstream.url_for("/products").unwrap().as_str(),
            "https://shop.example.com/api/v2/products"
        );
        assert_eq!(
            downstream.url_for("products/7?expand=stock").unwrap().as_str(),
            "https://shop.example.com/api/v2/products/7?expand=stock"
        );
        assert_eq!(
            downstream.url_for("http://other.example.com/x").unwrap().as_str(),
            "http://other.example.com/x"
        );
    }

    #[test]
    fn test_parse_retry_after() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2026 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);

        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers, now), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(
            parse_retry_after(&headers, now),
            Some(Duration::from_secs(120))
        );

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:30 GMT"),
        );
        assert_eq!(
            parse_retry_after(&headers, now),
            Some(Duration::from_secs(30))
        );

        // Dates in the past mean "retry now"
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:27:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers, now), Some(Duration::ZERO));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers, now), None);
    }

    #[tokio::test]
    async fn test_rate_limited_response_with_correlation_header() {
        crate::logging::init_test_logging();
        let (base_url, request_rx) = serve_once(
            "HTTP/1.1 429 Too Many Requests\r\nRetry-After: 2\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let downstream = downstream(&base_url);

        let response = CorrelationContext::flow_with_id("req-77", async {
            downstream
                .call("/products", "get", &CancellationToken::new())
                .await
        })
        .await
        .unwrap();

        assert_eq!(response.status, 429);
        assert_eq!(response.retry_after, Some(Duration::from_secs(2)));

        let request = request_rx.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /products http/1.1"));
        assert!(request.contains("x-correlation-id: req-77"));
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let downstream = downstream(&format!("http://{}", addr));
        let err = downstream
            .call("/products", "GET", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Connect);
    }

    #[tokio::test]
    async fn test_cancelled_before_response() {
        // Accepts but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let downstream = downstream(&format!("http://{}", addr));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = downstream
            .call("/products", "GET", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_invalid_method() {
        let downstream = downstream("http://127.0.0.1:9");
        let err = downstream
            .call("/products", "GE T", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Other);
    }
}
