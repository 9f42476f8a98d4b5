//! Orchestrator errors.

use thiserror::Error;
use watchhamster_common::MonitoringMode;
use watchhamster_notify::WebhookError;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("WatchHamster is not initialized")]
    NotInitialized,

    /// The process manager was shut down
    #[error("WatchHamster has been shut down")]
    ShutDown,

    #[error("Monitoring already running in {0} mode")]
    AlreadyRunning(MonitoringMode),

    #[error("Monitoring is not running")]
    NotRunning,

    #[error("Unknown monitor: {0}")]
    UnknownMonitor(String),

    /// Neither a registered factory nor a probe backs the monitor
    #[error("Monitor {0} has no probe and no registered task")]
    NoMonitorTask(String),

    #[error("No monitors selected for {0} mode")]
    NoMonitorsSelected(MonitoringMode),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Process(#[from] watchhamster_common::ProcessError),

    #[error(transparent)]
    Storage(#[from] watchhamster_common::Error),

    #[error(transparent)]
    Notification(#[from] WebhookError),
}
