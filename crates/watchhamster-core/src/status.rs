use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use watchhamster_common::MonitoringMode;
use watchhamster_process_management::ProcessInfo;
use watchhamster_process_state::ProcessStatus;
use watchhamster_monitoring::HealthStatus;

/// Orchestrator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Stopped,
    Initializing,
    Running,
    Stopping,
    Error,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Stopped => "stopped",
            SystemStatus::Initializing => "initializing",
            SystemStatus::Running => "running",
            SystemStatus::Stopping => "stopping",
            SystemStatus::Error => "error",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by `WatchHamsterCore::get_system_status`
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatusInfo {
    pub status: SystemStatus,
    pub mode: Option<MonitoringMode>,
    pub initialized: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    /// Monitors whose task is running
    pub active_monitors: Vec<String>,
    pub total_monitors: usize,
    pub healthy_monitors: usize,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub monitors: Vec<ProcessInfo>,
}

impl SystemStatusInfo {
    pub(crate) fn summarize(monitors: &[ProcessInfo]) -> (Vec<String>, usize) {
        let active = monitors
            .iter()
            .filter(|m| m.status == ProcessStatus::Running)
            .map(|m| m.id.clone())
            .collect();
        let healthy = monitors
            .iter()
            .filter(|m| m.health == HealthStatus::Healthy)
            .count();
        (active, healthy)
    }

    pub fn is_running(&self) -> bool {
        self.status == SystemStatus::Running
    }
}
