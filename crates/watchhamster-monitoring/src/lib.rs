//! # WatchHamster Monitoring
//!
//! Health evaluation for supervised monitors.
//!
//! This crate provides:
//! - [`HealthStatus`] and the [`HealthPolicy`] that derives it from a monitor's
//!   lifecycle status, the state of its backing task and its error counter
//! - [`HealthCheckResult`], the point-in-time snapshot returned by health checks
//! - HTTP probes and a probe loop that feeds failures back to a monitor

pub mod http;
pub mod probe_monitor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use watchhamster_process_state::ProcessStatus;

/// Default number of recorded errors at which a live monitor is unhealthy.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Probe timeout: {id}")]
    Timeout { id: String },

    #[error("Probe connection failed: {id} - {reason}")]
    ConnectionFailed { id: String, reason: String },

    #[error("Probe invalid response: {id} - {response}")]
    InvalidResponse { id: String, response: String },

    #[error("Probe endpoint not configured: {id}")]
    NotConfigured { id: String },
}

/// Result type for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Health of a supervised monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "healthy" => Ok(HealthStatus::Healthy),
            "degraded" => Ok(HealthStatus::Degraded),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            "unknown" => Ok(HealthStatus::Unknown),
            other => Err(format!("unknown health status: {}", other)),
        }
    }
}

/// Observed state of the task backing a monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// No task is attached
    Missing,
    /// Task is still running
    Alive,
    /// Task returned `Ok`
    Completed,
    /// Task returned an error
    Failed(String),
    /// Task finished without reporting an outcome (panicked or aborted)
    Vanished,
}

/// Rules that map status, task state and error count to a [`HealthStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub error_threshold: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }
}

impl HealthPolicy {
    pub fn new(error_threshold: u32) -> Self {
        Self { error_threshold }
    }

    /// Evaluate health. Returns the health and, when relevant, the reason.
    pub fn evaluate(
        &self,
        status: ProcessStatus,
        task: &TaskState,
        error_count: u32,
    ) -> (HealthStatus, Option<String>) {
        match status {
            ProcessStatus::Running => match task {
                TaskState::Failed(reason) => (HealthStatus::Unhealthy, Some(reason.clone())),
                TaskState::Completed => (
                    HealthStatus::Degraded,
                    Some("monitor task finished".to_string()),
                ),
                TaskState::Missing => (
                    HealthStatus::Unhealthy,
                    Some("no monitor task attached".to_string()),
                ),
                TaskState::Vanished => (
                    HealthStatus::Unhealthy,
                    Some("monitor task panicked or was aborted".to_string()),
                ),
                TaskState::Alive => (self.classify_errors(error_count), None),
            },
            ProcessStatus::Error => (HealthStatus::Unhealthy, None),
            _ => (HealthStatus::Unknown, None),
        }
    }

    /// Map an error counter to health for a live task.
    pub fn classify_errors(&self, error_count: u32) -> HealthStatus {
        if error_count >= self.error_threshold {
            HealthStatus::Unhealthy
        } else if error_count > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Point-in-time health snapshot of a monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub id: String,
    pub status: ProcessStatus,
    pub health: HealthStatus,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub is_healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
}

/// Consecutive success/failure tracker for a probe.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    pub is_healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub failure_reason: Option<String>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            is_healthy: true,
            last_check: None,
            last_success: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            failure_reason: None,
        }
    }

    pub fn record_success(&mut self) {
        let now = Utc::now();
        self.is_healthy = true;
        self.last_check = Some(now);
        self.last_success = Some(now);
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
        self.failure_reason = None;
    }

    pub fn record_failure(&mut self, reason: String, failure_threshold: u32) {
        self.last_check = Some(Utc::now());
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.failure_reason = Some(reason);

        if self.consecutive_failures >= failure_threshold {
            self.is_healthy = false;
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub use http::*;
pub use probe_monitor::*;
