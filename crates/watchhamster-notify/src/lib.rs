//! Webhook notifications for WatchHamster.
//!
//! Every message is posted as a JSON body `{text, timestamp, source}` to the
//! webhook configured for its [`Endpoint`]. Delivery failures are logged and
//! counted, never propagated into supervision.
//!
//! # Usage
//!
//! ```no_run
//! use watchhamster_notify::{Endpoint, Notifier, NotifyEvent, SenderConfig, WebhookSender};
//!
//! # fn main() -> Result<(), watchhamster_notify::WebhookError> {
//! let config = SenderConfig::default()
//!     .with_endpoint(Endpoint::WatchHamster, "https://hooks.example.com/watchhamster");
//! let notifier = Notifier::new(WebhookSender::new(config)?);
//!
//! // Fire-and-forget
//! notifier.notify(NotifyEvent::monitor_failed("kospi-close", "3 attempts failed"));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod payload;
pub mod sender;

pub use error::WebhookError;
pub use events::NotifyEvent;
pub use payload::{Endpoint, MessagePriority, WebhookPayload};
pub use sender::{DeliveryStatus, SendStatistics, SenderConfig, WebhookSender, MAX_RETRY_DELAY};

use std::sync::Arc;
use tracing::{debug, error};

/// Central notification dispatcher.
#[derive(Clone)]
pub struct Notifier {
    sender: Option<Arc<WebhookSender>>,
}

impl Notifier {
    #[must_use]
    pub fn new(sender: WebhookSender) -> Self {
        Self {
            sender: Some(Arc::new(sender)),
        }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self { sender: None }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn statistics(&self) -> Option<SendStatistics> {
        self.sender.as_ref().map(|s| s.statistics())
    }

    /// Send a notification without waiting for delivery.
    ///
    /// Must be called from within a Tokio runtime. Errors are logged.
    pub fn notify(&self, event: NotifyEvent) {
        let Some(sender) = self.sender.as_ref() else {
            debug!("Notifications disabled, skipping event");
            return;
        };

        let endpoint = event.endpoint();
        if !sender.has_endpoint(endpoint) {
            debug!(endpoint = %endpoint, "No webhook for endpoint, skipping event");
            return;
        }

        let sender = Arc::clone(sender);
        tokio::spawn(async move {
            if let Err(e) = sender
                .send_keyed(endpoint, &event.text(), &event.dedup_key())
                .await
            {
                error!(endpoint = %endpoint, error = %e, "Failed to send notification");
            }
        });
    }

    /// Send a notification and wait for the delivery result.
    pub async fn notify_and_wait(&self, event: NotifyEvent) -> Result<DeliveryStatus, WebhookError> {
        let sender = self.sender.as_ref().ok_or(WebhookError::Disabled)?;
        sender
            .send_keyed(event.endpoint(), &event.text(), &event.dedup_key())
            .await
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::disabled()
    }
}
