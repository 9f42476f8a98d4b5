//! Webhook sender with retry, deduplication and statistics.

use crate::error::WebhookError;
use crate::payload::{Endpoint, WebhookPayload};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Upper bound for a single retry delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Sender configuration
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub source: String,
    pub endpoints: BTreeMap<Endpoint, String>,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
    pub dedup_window: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            source: "watchhamster".to_string(),
            endpoints: BTreeMap::new(),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            dedup_window: Duration::from_secs(3600),
        }
    }
}

impl SenderConfig {
    pub fn with_endpoint(mut self, endpoint: Endpoint, url: impl Into<String>) -> Self {
        self.endpoints.insert(endpoint, url.into());
        self
    }
}

/// Outcome of a successful `send`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered { attempts: u32, status: u16 },
    /// Identical message already delivered inside the dedup window
    Duplicate,
}

/// Delivery counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SendStatistics {
    pub total_messages: u64,
    pub successful_sends: u64,
    pub failed_sends: u64,
    pub duplicates_suppressed: u64,
    pub retry_attempts: u64,
    pub last_send_time: Option<DateTime<Utc>>,
    /// Exponential moving average over successful requests
    pub average_response_time_ms: f64,
}

impl SendStatistics {
    pub fn success_rate(&self) -> f64 {
        let attempted = self.successful_sends + self.failed_sends;
        if attempted == 0 {
            0.0
        } else {
            self.successful_sends as f64 / attempted as f64
        }
    }

    fn record_response_time(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.average_response_time_ms = if self.successful_sends <= 1 {
            ms
        } else {
            self.average_response_time_ms * 0.9 + ms * 0.1
        };
    }
}

/// Posts [`WebhookPayload`]s to configured endpoints
pub struct WebhookSender {
    config: SenderConfig,
    client: reqwest::Client,
    recent: Mutex<HashMap<String, Instant>>,
    stats: Mutex<SendStatistics>,
}

impl WebhookSender {
    pub fn new(config: SenderConfig) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config,
            client,
            recent: Mutex::new(HashMap::new()),
            stats: Mutex::new(SendStatistics::default()),
        })
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn has_endpoint(&self, endpoint: Endpoint) -> bool {
        self.config.endpoints.contains_key(&endpoint)
    }

    pub fn statistics(&self) -> SendStatistics {
        self.stats.lock().clone()
    }

    /// Delay before retry number `attempt` (0-based): `min(base * 2^n, 60 s)`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.config
            .retry_base_delay
            .saturating_mul(factor)
            .min(MAX_RETRY_DELAY)
    }

    fn message_hash(endpoint: Endpoint, dedup_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(endpoint.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(dedup_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn is_duplicate(&self, hash: &str) -> bool {
        let mut recent = self.recent.lock();
        let window = self.config.dedup_window;
        recent.retain(|_, sent_at| sent_at.elapsed() < window);
        recent.contains_key(hash)
    }

    /// Send `text` to `endpoint`, retrying failed attempts.
    pub async fn send(&self, endpoint: Endpoint, text: &str) -> Result<DeliveryStatus, WebhookError> {
        self.send_keyed(endpoint, text, text).await
    }

    /// Like [`send`](Self::send), but duplicates are detected by `dedup_key`
    /// instead of the full text.
    pub async fn send_keyed(
        &self,
        endpoint: Endpoint,
        text: &str,
        dedup_key: &str,
    ) -> Result<DeliveryStatus, WebhookError> {
        let url = self
            .config
            .endpoints
            .get(&endpoint)
            .ok_or_else(|| WebhookError::NotConfigured(endpoint.to_string()))?;

        let hash = Self::message_hash(endpoint, dedup_key);
        if self.is_duplicate(&hash) {
            self.stats.lock().duplicates_suppressed += 1;
            debug!(endpoint = %endpoint, "Duplicate webhook message suppressed");
            return Ok(DeliveryStatus::Duplicate);
        }

        self.stats.lock().total_messages += 1;
        let payload = WebhookPayload::new(text, &self.config.source);
        let mut attempt = 0u32;

        loop {
            let started = Instant::now();
            match self.post_once(url, &payload).await {
                Ok(status) => {
                    {
                        let mut stats = self.stats.lock();
                        stats.successful_sends += 1;
                        stats.last_send_time = Some(Utc::now());
                        stats.record_response_time(started.elapsed());
                    }
                    self.recent.lock().insert(hash, Instant::now());
                    info!(endpoint = %endpoint, attempts = attempt + 1, "Webhook delivered");
                    return Ok(DeliveryStatus::Delivered {
                        attempts: attempt + 1,
                        status,
                    });
                }
                Err(e) if attempt < self.config.max_retries => {
                    let delay = self.retry_delay(attempt);
                    self.stats.lock().retry_attempts += 1;
                    warn!(
                        endpoint = %endpoint,
                        attempt = attempt + 1,
                        error = %e,
                        "Webhook attempt failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.stats.lock().failed_sends += 1;
                    warn!(endpoint = %endpoint, error = %e, "Webhook delivery failed");
                    return Err(WebhookError::RetriesExhausted {
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }

    async fn post_once(&self, url: &str, payload: &WebhookPayload) -> Result<u16, WebhookError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(status.as_u16())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(WebhookError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> SenderConfig {
        SenderConfig {
            retry_base_delay: Duration::from_millis(5),
            ..SenderConfig::default()
        }
        .with_endpoint(Endpoint::WatchHamster, format!("{}/hook", server.uri()))
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let sender = WebhookSender::new(SenderConfig::default()).unwrap();
        assert_eq!(sender.retry_delay(0), Duration::from_secs(1));
        assert_eq!(sender.retry_delay(2), Duration::from_secs(4));
        assert_eq!(sender.retry_delay(10), MAX_RETRY_DELAY);
        assert_eq!(sender.retry_delay(40), MAX_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_send_posts_payload_and_dedups() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "text": "monitor down",
                "source": "watchhamster"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = WebhookSender::new(config_for(&server)).unwrap();
        let first = sender.send(Endpoint::WatchHamster, "monitor down").await.unwrap();
        assert_eq!(first, DeliveryStatus::Delivered { attempts: 1, status: 200 });

        let second = sender.send(Endpoint::WatchHamster, "monitor down").await.unwrap();
        assert_eq!(second, DeliveryStatus::Duplicate);

        let stats = sender.statistics();
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.successful_sends, 1);
        assert_eq!(stats.duplicates_suppressed, 1);
        assert!(stats.last_send_time.is_some());
        assert_eq!(stats.success_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_send_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sender = WebhookSender::new(config_for(&server)).unwrap();
        let status = sender.send(Endpoint::WatchHamster, "retry me").await.unwrap();
        assert_eq!(status, DeliveryStatus::Delivered { attempts: 3, status: 200 });
        assert_eq!(sender.statistics().retry_attempts, 2);
    }

    #[tokio::test]
    async fn test_send_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(4)
            .mount(&server)
            .await;

        let sender = WebhookSender::new(config_for(&server)).unwrap();
        let result = sender.send(Endpoint::WatchHamster, "never delivered").await;
        assert!(matches!(
            result,
            Err(WebhookError::RetriesExhausted { attempts: 4, .. })
        ));

        let stats = sender.statistics();
        assert_eq!(stats.failed_sends, 1);
        assert_eq!(stats.retry_attempts, 3);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint() {
        let sender = WebhookSender::new(SenderConfig::default()).unwrap();
        let result = sender.send(Endpoint::News, "hello").await;
        assert!(matches!(result, Err(WebhookError::NotConfigured(_))));
        assert!(!sender.has_endpoint(Endpoint::News));
    }
}
