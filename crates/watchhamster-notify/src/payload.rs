//! Webhook wire payload and routing types.

use crate::error::WebhookError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// JSON body posted to every webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub text: String,
    /// RFC 3339 send time
    pub timestamp: String,
    pub source: String,
}

impl WebhookPayload {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            source: source.into(),
        }
    }
}

/// Message urgency, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Critical,
    High,
    Normal,
    Low,
}

impl MessagePriority {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named webhook destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Watchdog status and errors
    #[serde(rename = "watchhamster")]
    WatchHamster,
    /// News comparison and publication reports
    News,
    Test,
}

impl Endpoint {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WatchHamster => "watchhamster",
            Self::News => "news",
            Self::Test => "test",
        }
    }
}

impl FromStr for Endpoint {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watchhamster" => Ok(Self::WatchHamster),
            "news" => Ok(Self::News),
            "test" => Ok(Self::Test),
            other => Err(WebhookError::NotConfigured(other.to_string())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
