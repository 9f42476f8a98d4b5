//! Error types for webhook delivery.

use thiserror::Error;

/// Errors that can occur when sending a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// No URL configured for the endpoint
    #[error("Endpoint not configured: {0}")]
    NotConfigured(String),

    /// The webhook answered with a non-success status
    #[error("Webhook returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Every attempt failed
    #[error("Webhook delivery failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Notifications are switched off
    #[error("Notifications disabled")]
    Disabled,
}
