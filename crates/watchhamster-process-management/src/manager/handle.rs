//! ProcessManager handle - Public API for interacting with the process manager.
//!
//! The handle is cheap to clone and shared across tasks. All methods send
//! commands to the internal actor and await responses.

use super::commands::ManagerCommand;
use super::types::{ProcessEvent, ProcessInfo, ProcessManagerState, RecoveryOutcome, Result};
use crate::monitors::SharedFactory;
use tokio::sync::{broadcast, mpsc, oneshot};
use watchhamster_common::ProcessError;
use watchhamster_monitoring::HealthCheckResult;

/// Handle to the supervision actor.
#[derive(Clone)]
pub struct ProcessManager {
    pub(super) cmd_tx: mpsc::Sender<ManagerCommand>,
    pub(super) event_tx: broadcast::Sender<ProcessEvent>,
}

impl ProcessManager {
    // -------------------------------------------------------------------------
    // Error Mapping Helpers
    // -------------------------------------------------------------------------

    fn map_send_err(context: &str) -> ProcessError {
        ProcessError::manager_unavailable(format!("{}: actor unavailable (channel closed)", context))
    }

    fn map_recv_err(context: &str) -> ProcessError {
        ProcessError::manager_unavailable(format!(
            "{}: actor dropped response (internal error)",
            context
        ))
    }

    async fn request<T>(
        &self,
        context: &str,
        build: impl FnOnce(oneshot::Sender<T>) -> ManagerCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| Self::map_send_err(context))?;
        rx.await.map_err(|_| Self::map_recv_err(context))
    }

    // -------------------------------------------------------------------------
    // Lifecycle Methods
    // -------------------------------------------------------------------------

    /// Register a monitor under `id` and start it.
    ///
    /// Each attempt builds a fresh task from `factory` and waits for the
    /// settle period. Failed attempts are retried with linear backoff up to
    /// the configured maximum, after which the monitor is left in `Error`
    /// and `ProcessError::RestartFailed` is returned. The factory is kept for
    /// restarts and recovery.
    ///
    /// # Errors
    /// - `ProcessError::AlreadyRunning` if the monitor is running or starting
    /// - `ProcessError::RestartFailed` when every attempt failed
    /// - `ProcessError::OperationNotAllowed` after shutdown
    pub async fn start(&self, id: &str, factory: SharedFactory) -> Result<()> {
        self.request("start", |resp| ManagerCommand::StartProcess {
            id: id.to_string(),
            factory,
            resp,
        })
        .await?
    }

    /// Stop a monitor and discard its record.
    ///
    /// Waits up to the stop timeout for the task to finish. Queued behind any
    /// operation already running for the monitor.
    pub async fn stop(&self, id: &str) -> Result<()> {
        self.request("stop", |resp| ManagerCommand::StopProcess {
            id: id.to_string(),
            resp,
        })
        .await?
    }

    /// Stop the monitor, pause, and start it again with the retained factory.
    pub async fn restart(&self, id: &str) -> Result<()> {
        self.request("restart", |resp| ManagerCommand::RestartProcess {
            id: id.to_string(),
            resp,
        })
        .await?
    }

    /// Stop every monitor. Later starts and restarts are refused; queries still work.
    pub async fn shutdown(&self) -> Result<()> {
        self.request("shutdown", |resp| ManagerCommand::Shutdown { resp })
            .await?
    }

    // -------------------------------------------------------------------------
    // Health Methods
    // -------------------------------------------------------------------------

    /// Evaluate the monitor's health now and store the result.
    ///
    /// While an operation is running for the monitor the last stored
    /// snapshot is returned unchanged.
    pub async fn check_health(&self, id: &str) -> Result<HealthCheckResult> {
        self.request("check_health", |resp| ManagerCommand::CheckHealth {
            id: id.to_string(),
            resp,
        })
        .await?
    }

    pub async fn check_all_health(&self) -> Result<Vec<HealthCheckResult>> {
        self.request("check_all_health", |resp| ManagerCommand::CheckAllHealth {
            resp,
        })
        .await
    }

    /// Stop and start the monitor if it is unhealthy, resetting its error count on success.
    pub async fn auto_recover(&self, id: &str) -> Result<RecoveryOutcome> {
        self.request("auto_recover", |resp| ManagerCommand::AutoRecover {
            id: id.to_string(),
            resp,
        })
        .await?
    }

    /// Pause the periodic health loop
    pub async fn pause_health_monitoring(&self) -> Result<()> {
        self.request("pause_health_monitoring", |resp| {
            ManagerCommand::SetHealthMonitoring {
                enabled: false,
                resp,
            }
        })
        .await
    }

    pub async fn resume_health_monitoring(&self) -> Result<()> {
        self.request("resume_health_monitoring", |resp| {
            ManagerCommand::SetHealthMonitoring {
                enabled: true,
                resp,
            }
        })
        .await
    }

    /// Toggle recovery of unhealthy monitors from the health loop
    pub async fn set_auto_recover(&self, enabled: bool) -> Result<()> {
        self.request("set_auto_recover", |resp| ManagerCommand::SetAutoRecover {
            enabled,
            resp,
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Query Methods
    // -------------------------------------------------------------------------

    pub async fn get_process_info(&self, id: &str) -> Result<ProcessInfo> {
        self.request("get_process_info", |resp| ManagerCommand::GetProcessInfo {
            id: id.to_string(),
            resp,
        })
        .await?
    }

    /// Information about every registered monitor, sorted by id
    pub async fn get_all_process_info(&self) -> Result<Vec<ProcessInfo>> {
        self.request("get_all_process_info", |resp| {
            ManagerCommand::GetAllProcessInfo { resp }
        })
        .await
    }

    /// Get the current manager state.
    ///
    /// Returns `ProcessManagerState::Error` if the actor is unavailable.
    pub async fn get_manager_state(&self) -> ProcessManagerState {
        self.request("get_manager_state", |resp| ManagerCommand::GetManagerState {
            resp,
        })
        .await
        .unwrap_or_else(|e| ProcessManagerState::Error(e.to_string()))
    }

    /// Subscribe to lifecycle and health events.
    ///
    /// Slow receivers lose the oldest events (`RecvError::Lagged`).
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.event_tx.subscribe()
    }
}
