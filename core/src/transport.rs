//! The I/O seam: executes an `HttpRequest` and returns an `HttpResponse`.
//!
//! `Transport` is the capability the host provides. Tests substitute scripted
//! implementations; production code uses `ReqwestTransport`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, trace, warn, Level};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Round-trips slower than this are logged at warn level.
pub const SLOW_REQUEST: Duration = Duration::from_secs(2);

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one round-trip. Non-2xx statuses are data, not errors; only
    /// connection failures and transport-level timeouts return `Err`.
    async fn execute(&self, request: HttpRequest, timeout: Duration) -> Result<HttpResponse, ApiError>;
}

/// `Transport` backed by a shared `reqwest::Client` (connection pooling).
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest, timeout: Duration) -> Result<HttpResponse, ApiError> {
        let label = format!("{} {}", request.method, request.path);
        trace!(request = %label, timeout_ms = timeout.as_millis() as u64, "dispatch");
        let started = Instant::now();

        let mut builder = self
            .client
            .request(reqwest_method(request.method), &request.path)
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, &label, timeout))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, &label, timeout))?;

        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        if response_level(status, elapsed) == Level::WARN {
            warn!(request = %label, status, elapsed_ms, bytes = body.len(), "slow or rejected response");
        } else {
            debug!(request = %label, status, elapsed_ms, bytes = body.len(), "response received");
        }
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// 4xx/5xx and slow responses are warnings; everything else is debug.
fn response_level(status: u16, elapsed: Duration) -> Level {
    if status >= 400 || elapsed > SLOW_REQUEST {
        Level::WARN
    } else {
        Level::DEBUG
    }
}

fn map_reqwest_error(err: reqwest::Error, label: &str, timeout: Duration) -> ApiError {
    if err.is_timeout() {
        ApiError::timeout(label, timeout)
    } else {
        ApiError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_map_one_to_one() {
        assert_eq!(reqwest_method(HttpMethod::Get), reqwest::Method::GET);
        assert_eq!(reqwest_method(HttpMethod::Patch), reqwest::Method::PATCH);
        assert_eq!(reqwest_method(HttpMethod::Delete), reqwest::Method::DELETE);
    }

    #[test]
    fn slow_and_failed_responses_warn() {
        assert_eq!(response_level(200, Duration::from_millis(150)), Level::DEBUG);
        assert_eq!(response_level(200, SLOW_REQUEST), Level::DEBUG);
        assert_eq!(response_level(200, Duration::from_millis(2_001)), Level::WARN);
        assert_eq!(response_level(404, Duration::ZERO), Level::WARN);
        assert_eq!(response_level(503, Duration::ZERO), Level::WARN);
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        // Port 9 (discard) on loopback is closed in test environments.
        let request = HttpRequest {
            method: HttpMethod::Get,
            path: "http://127.0.0.1:9/productos".to_string(),
            headers: Vec::new(),
            body: None,
        };
        let err = ReqwestTransport::new()
            .execute(request, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_) | ApiError::Timeout { .. }), "{err:?}");
    }
}
