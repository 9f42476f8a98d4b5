//! Shared data types for the process manager module.
//!
//! This module contains:
//! - Public types exposed to callers (options, state, process info, events)
//! - Crate-internal types used for orchestration (ManagedProcess, OpRequest)

use crate::config::SupervisionConfig;
use crate::lifecycle::CircuitBreaker;
use crate::monitors::{ErrorLedger, MonitorTask, SharedFactory};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use watchhamster_monitoring::{HealthCheckResult, HealthStatus};
use watchhamster_process_state::{ProcessStateMachine, ProcessStatus, StateStatistics};

// ============================================================================
// Public Types
// ============================================================================

/// Settings for the supervision actor
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerOptions {
    pub supervision: SupervisionConfig,
    /// Period of the health polling loop
    pub health_check_interval: Duration,
    /// Recover unhealthy monitors from the polling loop
    pub auto_recover: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            supervision: SupervisionConfig::default(),
            health_check_interval: Duration::from_secs(5),
            auto_recover: true,
        }
    }
}

/// Process manager overall state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProcessManagerState {
    Running,
    Stopping,
    Stopped,
    Error(String),
}

/// Result of [`ProcessManager::auto_recover`](super::ProcessManager::auto_recover)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Monitor was not unhealthy
    NotNeeded,
    /// Monitor was stopped and started again
    Recovered,
    Failed(String),
}

/// Process information structure for external queries
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub id: String,
    pub status: ProcessStatus,
    pub health: HealthStatus,
    pub restart_count: u32,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub uptime_secs: Option<u64>,
    /// Operation currently running for this monitor
    pub busy_with: Option<String>,
    pub pending_ops: usize,
    pub statistics: Option<StateStatistics>,
}

/// Events broadcast by the manager
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessEvent {
    Started { id: String, restart_count: u32 },
    StartFailed { id: String, reason: String },
    Stopped { id: String },
    StopFailed { id: String, reason: String },
    HealthChanged {
        id: String,
        from: HealthStatus,
        to: HealthStatus,
    },
    Recovered { id: String },
    RecoveryFailed { id: String, reason: String },
    /// Published on every health poll
    StatusReport { results: Vec<HealthCheckResult> },
}

impl ProcessEvent {
    /// Monitor the event is about, if any
    pub fn monitor_id(&self) -> Option<&str> {
        match self {
            ProcessEvent::Started { id, .. }
            | ProcessEvent::StartFailed { id, .. }
            | ProcessEvent::Stopped { id }
            | ProcessEvent::StopFailed { id, .. }
            | ProcessEvent::HealthChanged { id, .. }
            | ProcessEvent::Recovered { id }
            | ProcessEvent::RecoveryFailed { id, .. } => Some(id),
            ProcessEvent::StatusReport { .. } => None,
        }
    }
}

// ============================================================================
// Crate-Internal Types
// ============================================================================

pub(super) type Result<T> = std::result::Result<T, watchhamster_common::ProcessError>;

/// Kind of operation being performed on a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    /// Spawn the task with retries
    Start,
    /// Cancel the task; `discard` removes the record afterwards
    Stop { discard: bool },
    /// Stop, pause, start
    Restart,
    /// Stop and start an unhealthy monitor, then reset its error counter
    Recover,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Start => "start",
            OpKind::Stop { .. } => "stop",
            OpKind::Restart => "restart",
            OpKind::Recover => "recover",
        }
    }
}

/// Responder for an operation
pub(crate) enum OpResponder {
    Unit(oneshot::Sender<Result<()>>),
    Recovery(oneshot::Sender<Result<RecoveryOutcome>>),
}

/// A queued operation request waiting to be executed
pub(crate) struct OpRequest {
    pub kind: OpKind,
    /// Factory offered by a start, installed only if the start is accepted
    pub factory: Option<SharedFactory>,
    pub resp: Option<OpResponder>,
    /// Batch ID if this is part of a shutdown
    pub batch_id: Option<u64>,
}

/// Currently in-flight operation for a monitor
pub(crate) struct InFlightOp {
    pub kind: OpKind,
    pub resp: Option<OpResponder>,
    pub batch_id: Option<u64>,
}

/// One supervised monitor owned by the actor.
///
/// `task` is `None` while a job holds it, or when nothing is running.
pub(super) struct ManagedProcess {
    pub id: String,
    pub state: ProcessStateMachine,
    pub health: HealthStatus,
    pub factory: SharedFactory,
    pub ledger: Arc<ErrorLedger>,
    pub task: Option<MonitorTask>,
    pub restart_count: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub breaker: CircuitBreaker,
    pub in_flight: Option<InFlightOp>,
    pub pending_ops: VecDeque<OpRequest>,
}

impl ManagedProcess {
    pub fn new(id: &str, factory: SharedFactory) -> Self {
        Self {
            id: id.to_string(),
            state: ProcessStateMachine::new(id),
            health: HealthStatus::Unknown,
            factory,
            ledger: Arc::new(ErrorLedger::new()),
            task: None,
            restart_count: 0,
            start_time: None,
            last_check: None,
            breaker: CircuitBreaker::new(),
            in_flight: None,
            pending_ops: VecDeque::new(),
        }
    }

    pub fn status(&self) -> ProcessStatus {
        self.state.current_state()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn busy_op_name(&self) -> Option<&'static str> {
        self.in_flight.as_ref().map(|op| op.kind.name())
    }

    pub fn info(&self) -> ProcessInfo {
        let errors = self.ledger.snapshot();
        let uptime_secs = match (self.status(), self.start_time) {
            (ProcessStatus::Running, Some(started)) => {
                Some((Utc::now() - started).num_seconds().max(0) as u64)
            }
            _ => None,
        };

        ProcessInfo {
            id: self.id.clone(),
            status: self.status(),
            health: self.health,
            restart_count: self.restart_count,
            error_count: errors.error_count,
            last_error: errors.last_error,
            last_check: self.last_check,
            start_time: self.start_time,
            uptime_secs,
            busy_with: self.busy_op_name().map(str::to_string),
            pending_ops: self.pending_ops.len(),
            statistics: self
                .start_time
                .map(|started| self.state.calculate_statistics(started)),
        }
    }

    /// Snapshot without re-evaluating health
    pub fn health_snapshot(&self) -> HealthCheckResult {
        let errors = self.ledger.snapshot();
        HealthCheckResult {
            id: self.id.clone(),
            status: self.status(),
            health: self.health,
            error_count: errors.error_count,
            last_error: errors.last_error,
            checked_at: self.last_check.unwrap_or_else(Utc::now),
        }
    }
}

/// Pending shutdown tracking
pub(super) struct PendingBatch {
    pub pending_count: usize,
    pub failed_process_ids: Vec<String>,
    pub resp: Option<oneshot::Sender<Result<()>>>,
}
