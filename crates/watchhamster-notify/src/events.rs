//! Notification event types.

use crate::payload::{Endpoint, MessagePriority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use watchhamster_monitoring::HealthStatus;

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    // =========================================================================
    // Monitor lifecycle
    // =========================================================================
    /// A monitor reached Running
    MonitorStarted {
        monitor_id: String,
        restart_count: u32,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A monitor could not be started or recovered
    MonitorFailed {
        monitor_id: String,
        reason: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// An unhealthy monitor was restarted
    MonitorRecovered {
        monitor_id: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Health evaluation changed
    HealthChanged {
        monitor_id: String,
        from: HealthStatus,
        to: HealthStatus,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Orchestrator
    // =========================================================================
    /// Periodic or on-demand system status
    SystemStatus {
        message: String,
        running_monitors: usize,
        total_monitors: usize,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// An error handled by the orchestrator
    ErrorAlert {
        context: String,
        message: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // News
    // =========================================================================
    /// Business-day comparison result
    ComparisonSummary {
        date: String,
        summary: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Manual test message
    Test {
        message: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    pub fn monitor_started(monitor_id: impl Into<String>, restart_count: u32) -> Self {
        Self::MonitorStarted {
            monitor_id: monitor_id.into(),
            restart_count,
            timestamp: Utc::now(),
        }
    }

    pub fn monitor_failed(monitor_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MonitorFailed {
            monitor_id: monitor_id.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn monitor_recovered(monitor_id: impl Into<String>) -> Self {
        Self::MonitorRecovered {
            monitor_id: monitor_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn health_changed(monitor_id: impl Into<String>, from: HealthStatus, to: HealthStatus) -> Self {
        Self::HealthChanged {
            monitor_id: monitor_id.into(),
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    pub fn system_status(message: impl Into<String>, running_monitors: usize, total_monitors: usize) -> Self {
        Self::SystemStatus {
            message: message.into(),
            running_monitors,
            total_monitors,
            timestamp: Utc::now(),
        }
    }

    pub fn error_alert(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ErrorAlert {
            context: context.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn comparison_summary(date: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::ComparisonSummary {
            date: date.into(),
            summary: summary.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn test(message: impl Into<String>) -> Self {
        Self::Test {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::MonitorStarted { monitor_id, .. } => format!("Monitor started: {monitor_id}"),
            Self::MonitorFailed { monitor_id, .. } => format!("Monitor failed: {monitor_id}"),
            Self::MonitorRecovered { monitor_id, .. } => {
                format!("Monitor recovered: {monitor_id}")
            }
            Self::HealthChanged { monitor_id, to, .. } => {
                format!("Health {to}: {monitor_id}")
            }
            Self::SystemStatus { .. } => "WatchHamster status".to_string(),
            Self::ErrorAlert { context, .. } => format!("WatchHamster error: {context}"),
            Self::ComparisonSummary { date, .. } => format!("News comparison {date}"),
            Self::Test { .. } => "Test message".to_string(),
        }
    }

    /// Get the body text for this event.
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::MonitorStarted { restart_count, .. } => {
                if *restart_count == 0 {
                    "Started on first attempt".to_string()
                } else {
                    format!("Started after {restart_count} retries")
                }
            }
            Self::MonitorFailed { reason, .. } => reason.clone(),
            Self::MonitorRecovered { .. } => "Restarted after becoming unhealthy".to_string(),
            Self::HealthChanged { from, to, .. } => format!("{from} → {to}"),
            Self::SystemStatus {
                message,
                running_monitors,
                total_monitors,
                ..
            } => format!("{message}\nMonitors running: {running_monitors}/{total_monitors}"),
            Self::ErrorAlert { message, .. } => message.clone(),
            Self::ComparisonSummary { summary, .. } => summary.clone(),
            Self::Test { message, .. } => message.clone(),
        }
    }

    /// Full message text: title, body and time.
    #[must_use]
    pub fn text(&self) -> String {
        format!(
            "[{}] {}\n{}\n{}",
            self.priority(),
            self.title(),
            self.body(),
            self.timestamp().format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    /// Identity of the message for duplicate suppression; excludes the time.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!("{}\n{}", self.title(), self.body())
    }

    #[must_use]
    pub fn priority(&self) -> MessagePriority {
        match self {
            Self::MonitorFailed { .. } | Self::ErrorAlert { .. } => MessagePriority::Critical,
            Self::HealthChanged { to, .. } => match to {
                HealthStatus::Unhealthy => MessagePriority::High,
                HealthStatus::Degraded => MessagePriority::Normal,
                _ => MessagePriority::Low,
            },
            Self::MonitorRecovered { .. } => MessagePriority::High,
            Self::MonitorStarted { .. }
            | Self::SystemStatus { .. }
            | Self::ComparisonSummary { .. } => MessagePriority::Normal,
            Self::Test { .. } => MessagePriority::Low,
        }
    }

    /// Which webhook receives this event.
    #[must_use]
    pub const fn endpoint(&self) -> Endpoint {
        match self {
            Self::ComparisonSummary { .. } => Endpoint::News,
            Self::Test { .. } => Endpoint::Test,
            _ => Endpoint::WatchHamster,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::MonitorStarted { timestamp, .. }
            | Self::MonitorFailed { timestamp, .. }
            | Self::MonitorRecovered { timestamp, .. }
            | Self::HealthChanged { timestamp, .. }
            | Self::SystemStatus { timestamp, .. }
            | Self::ErrorAlert { timestamp, .. }
            | Self::ComparisonSummary { timestamp, .. }
            | Self::Test { timestamp, .. } => *timestamp,
        }
    }
}
