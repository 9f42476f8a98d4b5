// HTTP probe implementation

use crate::{ProbeError, ProbeOutcome, ProbeResult};
use chrono::Utc;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

const USER_AGENT: &str = "WatchHamster/1.0";

/// HTTP probe configuration
#[derive(Debug, Clone)]
pub struct HttpProbeConfig {
    pub endpoint: String,
    pub method: HttpMethod,
    pub timeout: Duration,
    pub expected_status: Vec<u16>,
    pub expected_body: Option<String>,
}

/// HTTP methods supported for probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
}

impl Default for HttpProbeConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            method: HttpMethod::Get,
            timeout: Duration::from_secs(5),
            expected_status: vec![200],
            expected_body: None,
        }
    }
}

impl HttpProbeConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_expected_status(mut self, status_codes: Vec<u16>) -> Self {
        self.expected_status = status_codes;
        self
    }

    pub fn with_expected_body(mut self, body: impl Into<String>) -> Self {
        self.expected_body = Some(body.into());
        self
    }
}

/// Probe an HTTP endpoint.
///
/// Connection failures, timeouts and unexpected responses are reported as an
/// unhealthy [`ProbeOutcome`]. Only an unusable configuration is an `Err`.
pub async fn probe_http(config: &HttpProbeConfig) -> ProbeResult<ProbeOutcome> {
    if config.endpoint.is_empty() {
        return Err(ProbeError::NotConfigured {
            id: "http-probe".to_string(),
        });
    }

    let start_time = std::time::Instant::now();
    debug!("Starting HTTP probe: {}", config.endpoint);

    let uri: Uri = config
        .endpoint
        .parse()
        .map_err(|e| ProbeError::InvalidResponse {
            id: config.endpoint.clone(),
            response: format!("Invalid URI: {}", e),
        })?;

    if uri.scheme_str() != Some("http") {
        return Err(ProbeError::InvalidResponse {
            id: config.endpoint.clone(),
            response: "only plain http endpoints can be probed".to_string(),
        });
    }

    let client = Client::builder(TokioExecutor::new()).build_http();

    let method = match config.method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
    };

    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("User-Agent", USER_AGENT)
        .body(Empty::<Bytes>::new())
        .map_err(|e| ProbeError::InvalidResponse {
            id: config.endpoint.clone(),
            response: format!("Failed to build request: {}", e),
        })?;

    let response = match timeout(config.timeout, client.request(request)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            warn!("HTTP probe connection failed: {} - {}", config.endpoint, e);
            return Ok(ProbeOutcome {
                is_healthy: false,
                checked_at: Utc::now(),
                response_time_ms: Some(start_time.elapsed().as_millis() as u64),
                error_message: Some(format!("Connection failed: {}", e)),
            });
        }
        Err(_) => {
            warn!("HTTP probe timeout: {}", config.endpoint);
            return Ok(ProbeOutcome {
                is_healthy: false,
                checked_at: Utc::now(),
                response_time_ms: Some(config.timeout.as_millis() as u64),
                error_message: Some("Timeout".to_string()),
            });
        }
    };

    let status = response.status();
    let elapsed = start_time.elapsed().as_millis() as u64;
    let status_ok = config.expected_status.contains(&status.as_u16());

    if status_ok {
        if let Some(ref expected) = config.expected_body {
            let body_bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| ProbeError::InvalidResponse {
                    id: config.endpoint.clone(),
                    response: format!("Failed to read body: {}", e),
                })?
                .to_bytes();
            let body = String::from_utf8_lossy(&body_bytes);

            if !body.contains(expected.as_str()) {
                debug!(
                    "HTTP probe body mismatch: {} (expected '{}')",
                    config.endpoint, expected
                );
                return Ok(ProbeOutcome {
                    is_healthy: false,
                    checked_at: Utc::now(),
                    response_time_ms: Some(elapsed),
                    error_message: Some(format!("Body does not contain '{}'", expected)),
                });
            }
        }
    }

    debug!(
        "HTTP probe complete: {} - status={} healthy={} time={}ms",
        config.endpoint, status, status_ok, elapsed
    );

    Ok(ProbeOutcome {
        is_healthy: status_ok,
        checked_at: Utc::now(),
        response_time_ms: Some(elapsed),
        error_message: if status_ok {
            None
        } else {
            Some(format!("Unexpected status code: {}", status))
        },
    })
}
