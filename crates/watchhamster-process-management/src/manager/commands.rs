//! Internal command protocol for the process manager actor.
//!
//! These types are NOT exposed outside the manager module.

use super::types::{ProcessInfo, ProcessManagerState, RecoveryOutcome, Result};
use crate::monitors::SharedFactory;
use tokio::sync::oneshot;
use watchhamster_monitoring::HealthCheckResult;

/// Command messages for the ProcessManager actor.
pub(super) enum ManagerCommand {
    /// Register (or re-register) a monitor and start it
    StartProcess {
        id: String,
        factory: SharedFactory,
        resp: oneshot::Sender<Result<()>>,
    },
    /// Stop a monitor and discard its record
    StopProcess {
        id: String,
        resp: oneshot::Sender<Result<()>>,
    },
    /// Stop and start a monitor with its retained factory
    RestartProcess {
        id: String,
        resp: oneshot::Sender<Result<()>>,
    },
    CheckHealth {
        id: String,
        resp: oneshot::Sender<Result<HealthCheckResult>>,
    },
    CheckAllHealth {
        resp: oneshot::Sender<Vec<HealthCheckResult>>,
    },
    AutoRecover {
        id: String,
        resp: oneshot::Sender<Result<RecoveryOutcome>>,
    },
    GetProcessInfo {
        id: String,
        resp: oneshot::Sender<Result<ProcessInfo>>,
    },
    GetAllProcessInfo {
        resp: oneshot::Sender<Vec<ProcessInfo>>,
    },
    GetManagerState {
        resp: oneshot::Sender<ProcessManagerState>,
    },
    /// Pause or resume the periodic health loop
    SetHealthMonitoring {
        enabled: bool,
        resp: oneshot::Sender<()>,
    },
    SetAutoRecover {
        enabled: bool,
        resp: oneshot::Sender<()>,
    },
    /// Stop every monitor and refuse further starts
    Shutdown { resp: oneshot::Sender<Result<()>> },
}
