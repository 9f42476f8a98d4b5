//! ProcessManagerActor - Internal actor that owns all supervision state
//!
//! The actor runs in a single task and processes commands from the handle,
//! completions from the OpRunner and health poll ticks. It is not directly
//! accessible from outside the manager module.

use super::commands::ManagerCommand;
use super::ops::{Job, OpCompleted, OpRunner, JOB_QUEUE_CAPACITY};
use super::types::{
    InFlightOp, ManagedProcess, ManagerOptions, OpKind, OpRequest, OpResponder, PendingBatch,
    ProcessEvent, ProcessInfo, ProcessManagerState, RecoveryOutcome, Result,
};
use crate::monitors::{MonitorTask, SharedFactory};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use watchhamster_common::ProcessError;
use watchhamster_monitoring::{HealthCheckResult, HealthPolicy, HealthStatus, TaskState};
use watchhamster_process_state::ProcessStatus;

/// Number of concurrent workers for the operation runner
const OP_RUNNER_CONCURRENCY: usize = 8;

/// Maximum queued operations per monitor
const MAX_PENDING_OPS_PER_PROCESS: usize = 32;

/// Maximum queued operations globally
const MAX_TOTAL_PENDING_OPS: usize = 1024;

static BATCH_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_batch_id() -> u64 {
    BATCH_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Outcome of preparing an operation for dispatch
enum Dispatch {
    /// Submit a job to the runner
    Run,
    /// Nothing to run; answer right away
    Finished(Result<RecoveryOutcome>),
}

pub(super) struct ProcessManagerActor {
    options: ManagerOptions,
    policy: HealthPolicy,
    processes: HashMap<String, ManagedProcess>,
    state: ProcessManagerState,
    /// Health poll enabled
    health_monitoring: bool,
    auto_recover: bool,
    op_runner: OpRunner,
    event_tx: broadcast::Sender<ProcessEvent>,
    /// Pending shutdown batches
    pending_batches: HashMap<u64, PendingBatch>,
    /// Total queued operations across all monitors
    total_pending_ops: usize,
    /// Set once the completion channel has closed
    completion_closed: bool,
}

impl ProcessManagerActor {
    pub(super) fn new(
        options: ManagerOptions,
        completed_tx: mpsc::Sender<OpCompleted>,
        event_tx: broadcast::Sender<ProcessEvent>,
    ) -> Self {
        let op_runner = OpRunner::new(OP_RUNNER_CONCURRENCY, completed_tx);

        ProcessManagerActor {
            policy: HealthPolicy::new(options.supervision.error_threshold),
            auto_recover: options.auto_recover,
            options,
            processes: HashMap::new(),
            state: ProcessManagerState::Running,
            health_monitoring: true,
            op_runner,
            event_tx,
            pending_batches: HashMap::new(),
            total_pending_ops: 0,
            completion_closed: false,
        }
    }

    /// Main event loop for the actor.
    ///
    /// The actor terminates once the command channel is closed (all handles
    /// dropped) and no queued, in-flight or batch work remains. Closing the
    /// command channel also stops every monitor.
    pub(super) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ManagerCommand>,
        mut completed_rx: mpsc::Receiver<OpCompleted>,
    ) {
        let mut heartbeat = tokio::time::interval(self.options.health_check_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut cmd_closed = false;

        loop {
            if cmd_closed && self.is_fully_drained() {
                info!("Command channel closed and all work drained; actor exiting");
                break;
            }

            // Completions first, then commands, then the health poll
            tokio::select! {
                biased;

                maybe_completed = completed_rx.recv(), if !self.completion_closed => {
                    if let Some(completed) = maybe_completed {
                        self.handle_op_completed(completed);
                    } else {
                        error!("Completion channel closed unexpectedly; failing all pending work");
                        self.handle_completion_channel_closed();
                    }
                }

                maybe_cmd = cmd_rx.recv(), if !cmd_closed => {
                    match maybe_cmd {
                        None => {
                            info!("Command channel closed; entering drain mode");
                            cmd_closed = true;
                            if !matches!(self.state, ProcessManagerState::Stopping | ProcessManagerState::Stopped) {
                                self.initiate_shutdown(None);
                            }
                        }
                        Some(cmd) => self.handle_command(cmd),
                    }
                }

                _ = heartbeat.tick() => {
                    if !cmd_closed && matches!(self.state, ProcessManagerState::Running) {
                        self.run_health_poll();
                    }
                }
            }
        }

        info!("ProcessManager actor terminated");
    }

    /// No completion can arrive anymore; fail everything that waits on one.
    fn handle_completion_channel_closed(&mut self) {
        if self.completion_closed {
            return;
        }
        self.completion_closed = true;
        self.state = ProcessManagerState::Error("completion channel closed".to_string());

        for (_batch_id, batch) in self.pending_batches.drain() {
            if let Some(resp) = batch.resp {
                let _ = resp.send(Err(ProcessError::manager_unavailable(
                    "completion channel closed",
                )));
            }
        }

        let process_ids: Vec<String> = self.processes.keys().cloned().collect();
        for process_id in process_ids {
            let err = ProcessError::manager_unavailable(format!(
                "completion channel closed while supervising {}",
                process_id
            ));
            if let Some(instance) = self.processes.get_mut(&process_id) {
                if let Some(in_flight) = instance.in_flight.take() {
                    if let Some(resp) = in_flight.resp {
                        Self::send_op_resp(resp, Err(err.clone()));
                    }
                }
            }
            self.fail_and_drain_pending_ops(&process_id, err);
        }

        self.total_pending_ops = 0;
    }

    fn handle_command(&mut self, cmd: ManagerCommand) {
        use ManagerCommand::*;

        match cmd {
            StartProcess { id, factory, resp } => {
                if let Err(e) = self.check_accepting(&id, "start") {
                    let _ = resp.send(Err(e));
                    return;
                }
                let offered = match self.register(&id, factory) {
                    Ok(offered) => offered,
                    Err(e) => {
                        let _ = resp.send(Err(e));
                        return;
                    }
                };
                self.schedule_op(
                    id,
                    OpKind::Start,
                    offered,
                    Some(OpResponder::Unit(resp)),
                    None,
                );
            }
            StopProcess { id, resp } => {
                // Allowed after shutdown
                if let Err(e) = self.check_operable(&id) {
                    let _ = resp.send(Err(e));
                    return;
                }
                self.schedule_op(
                    id,
                    OpKind::Stop { discard: true },
                    None,
                    Some(OpResponder::Unit(resp)),
                    None,
                );
            }
            RestartProcess { id, resp } => {
                if let Err(e) = self.check_accepting(&id, "restart") {
                    let _ = resp.send(Err(e));
                    return;
                }
                self.schedule_op(id, OpKind::Restart, None, Some(OpResponder::Unit(resp)), None);
            }
            AutoRecover { id, resp } => {
                if let Err(e) = self.check_accepting(&id, "recover") {
                    let _ = resp.send(Err(e));
                    return;
                }
                self.schedule_op(
                    id,
                    OpKind::Recover,
                    None,
                    Some(OpResponder::Recovery(resp)),
                    None,
                );
            }
            CheckHealth { id, resp } => {
                let _ = resp.send(self.check_health(&id));
            }
            CheckAllHealth { resp } => {
                let results: Vec<HealthCheckResult> = self
                    .sorted_ids()
                    .iter()
                    .filter_map(|id| self.check_health(id).ok())
                    .collect();
                let _ = resp.send(results);
            }
            GetProcessInfo { id, resp } => {
                let result = self
                    .processes
                    .get(&id)
                    .map(ManagedProcess::info)
                    .ok_or_else(|| ProcessError::not_found(&id));
                let _ = resp.send(result);
            }
            GetAllProcessInfo { resp } => {
                let _ = resp.send(self.all_process_info());
            }
            GetManagerState { resp } => {
                let _ = resp.send(self.state.clone());
            }
            SetHealthMonitoring { enabled, resp } => {
                if self.health_monitoring != enabled {
                    info!(
                        "Health monitoring {}",
                        if enabled { "resumed" } else { "paused" }
                    );
                }
                self.health_monitoring = enabled;
                let _ = resp.send(());
            }
            SetAutoRecover { enabled, resp } => {
                info!("Auto-recovery {}", if enabled { "enabled" } else { "disabled" });
                self.auto_recover = enabled;
                let _ = resp.send(());
            }
            Shutdown { resp } => {
                self.initiate_shutdown(Some(resp));
            }
        }
    }

    /// Reject operations that would start work after shutdown.
    fn check_accepting(&self, id: &str, operation: &str) -> Result<()> {
        self.check_operable(id)?;
        match self.state {
            ProcessManagerState::Stopping => Err(ProcessError::operation_not_allowed(
                id, operation, "Stopping",
            )),
            ProcessManagerState::Stopped => Err(ProcessError::operation_not_allowed(
                id, operation, "Stopped",
            )),
            _ => Ok(()),
        }
    }

    fn check_operable(&self, id: &str) -> Result<()> {
        if self.completion_closed {
            Err(ProcessError::manager_unavailable(format!(
                "cannot operate on {}: completion channel closed",
                id
            )))
        } else {
            Ok(())
        }
    }

    /// Create the record for `id` with `factory`.
    ///
    /// For an existing record the factory is returned instead; the start
    /// installs it once it is accepted.
    fn register(&mut self, id: &str, factory: SharedFactory) -> Result<Option<SharedFactory>> {
        match self.processes.get(id) {
            Some(instance) => {
                let status = instance.status();
                if !instance.is_busy()
                    && matches!(status, ProcessStatus::Running | ProcessStatus::Starting)
                {
                    return Err(ProcessError::already_running(id, status.as_str()));
                }
                Ok(Some(factory))
            }
            None => {
                debug!("Registering monitor {}", id);
                self.processes
                    .insert(id.to_string(), ManagedProcess::new(id, factory));
                Ok(None)
            }
        }
    }

    /// Schedule an operation on a monitor.
    ///
    /// Runs it now if the monitor is idle, queues it otherwise. Operations
    /// belonging to a batch are never dropped silently: every exit path
    /// accounts for them via `batch_op_completed`.
    fn schedule_op(
        &mut self,
        process_id: String,
        op: OpKind,
        factory: Option<SharedFactory>,
        resp: Option<OpResponder>,
        batch_id: Option<u64>,
    ) {
        let instance = match self.processes.get_mut(&process_id) {
            Some(inst) => inst,
            None => {
                if let Some(resp) = resp {
                    Self::send_op_resp(resp, Err(ProcessError::not_found(&process_id)));
                }
                if let Some(batch_id) = batch_id {
                    self.batch_op_completed(batch_id, Some(process_id));
                }
                return;
            }
        };

        if instance.pending_ops.len() >= MAX_PENDING_OPS_PER_PROCESS
            || self.total_pending_ops >= MAX_TOTAL_PENDING_OPS
        {
            let limit = if instance.pending_ops.len() >= MAX_PENDING_OPS_PER_PROCESS {
                MAX_PENDING_OPS_PER_PROCESS
            } else {
                MAX_TOTAL_PENDING_OPS
            };
            debug!(
                "Queue limit reached for monitor {} (local {}, global {}), op {}",
                process_id,
                instance.pending_ops.len(),
                self.total_pending_ops,
                op.name()
            );
            if let Some(resp) = resp {
                Self::send_op_resp(resp, Err(ProcessError::queue_full(&process_id, limit)));
            }
            if let Some(batch_id) = batch_id {
                self.batch_op_completed(batch_id, Some(process_id));
            }
            return;
        }

        if instance.is_busy() {
            debug!(
                "Monitor '{}' busy with {}, queueing {} operation",
                process_id,
                instance.busy_op_name().unwrap_or("operation"),
                op.name()
            );
            instance.pending_ops.push_back(OpRequest {
                kind: op,
                factory,
                resp,
                batch_id,
            });
            self.total_pending_ops += 1;
            return;
        }

        self.start_op_now(&process_id, op, factory, resp, batch_id);
    }

    /// Start an operation immediately (monitor must be idle).
    fn start_op_now(
        &mut self,
        process_id: &str,
        op: OpKind,
        factory: Option<SharedFactory>,
        resp: Option<OpResponder>,
        batch_id: Option<u64>,
    ) {
        let Some(instance) = self.processes.get_mut(process_id) else {
            return;
        };

        let previous_health = instance.health;
        let dispatch = Self::prepare_dispatch(instance, op, &self.policy);
        Self::emit_health_change(&self.event_tx, instance, previous_health);

        if let Dispatch::Finished(answer) = dispatch {
            self.finish_op(process_id, op, resp, batch_id, answer);
            return;
        }
        if let Some(factory) = factory {
            instance.factory = factory;
        }

        instance.in_flight = Some(InFlightOp {
            kind: op,
            resp,
            batch_id,
        });

        let job = Job {
            process_id: process_id.to_string(),
            op,
            task: instance.task.take(),
            factory: instance.factory.clone(),
            ledger: instance.ledger.clone(),
            settings: self.options.supervision.clone(),
            batch_id,
        };

        let (job, err) = match self.op_runner.job_tx.try_send(job) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(job)) => {
                error!("OpRunner job channel full, cannot submit job for {}", process_id);
                (job, ProcessError::queue_full(process_id, JOB_QUEUE_CAPACITY))
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                error!("OpRunner job channel closed");
                (job, ProcessError::manager_unavailable("operation runner shut down"))
            }
        };

        // Job never ran: put the task back and fail the request
        let in_flight = self.processes.get_mut(process_id).and_then(|inst| {
            inst.task = job.task;
            inst.in_flight.take()
        });
        if let Some(in_flight) = in_flight {
            if let Some(resp) = in_flight.resp {
                Self::send_op_resp(resp, Err(err));
            }
        }
        if let Some(batch_id) = batch_id {
            self.batch_op_completed(batch_id, Some(process_id.to_string()));
        }
    }

    /// Validate and record the transition that begins `op`.
    fn prepare_dispatch(
        instance: &mut ManagedProcess,
        op: OpKind,
        policy: &HealthPolicy,
    ) -> Dispatch {
        let status = instance.status();

        match op {
            OpKind::Start => {
                if instance.task.is_some()
                    && matches!(status, ProcessStatus::Running | ProcessStatus::Starting)
                {
                    return Dispatch::Finished(Err(ProcessError::already_running(
                        &instance.id,
                        status.as_str(),
                    )));
                }
                if let Err(e) = instance.state.transition_to_starting() {
                    return Dispatch::Finished(Err(e));
                }
                instance.start_time = Some(Utc::now());
                Dispatch::Run
            }
            OpKind::Stop { .. } => {
                if instance.task.is_none() && status.is_terminal() {
                    if status == ProcessStatus::Error {
                        log_transition(&instance.id, instance.state.transition_to_stopped());
                    }
                    instance.health = HealthStatus::Unknown;
                    return Dispatch::Finished(Ok(RecoveryOutcome::NotNeeded));
                }
                match instance.state.transition_to_stopping() {
                    Ok(()) => Dispatch::Run,
                    Err(e) => Dispatch::Finished(Err(e)),
                }
            }
            OpKind::Restart => {
                if status != ProcessStatus::Stopped {
                    if let Err(e) = instance.state.transition_to_stopping() {
                        return Dispatch::Finished(Err(e));
                    }
                }
                Dispatch::Run
            }
            OpKind::Recover => {
                let check = Self::evaluate_health(instance, policy);
                if check.health != HealthStatus::Unhealthy {
                    return Dispatch::Finished(Ok(RecoveryOutcome::NotNeeded));
                }
                if !instance.state.can_recover() {
                    return Dispatch::Finished(Ok(RecoveryOutcome::Failed(format!(
                        "cannot recover from {}",
                        status
                    ))));
                }
                if instance.breaker.is_tripped() {
                    let remaining = instance.breaker.remaining_cooldown().unwrap_or_default();
                    return Dispatch::Finished(Ok(RecoveryOutcome::Failed(format!(
                        "circuit breaker open, recovery allowed again in {}s",
                        remaining.as_secs()
                    ))));
                }

                instance.breaker.record_attempt();
                let reason = check
                    .last_error
                    .unwrap_or_else(|| format!("{} errors recorded", check.error_count));
                info!("Recovering monitor {}: {}", instance.id, reason);
                match instance.state.transition_to_recovering(reason) {
                    Ok(()) => Dispatch::Run,
                    Err(e) => Dispatch::Finished(Err(e)),
                }
            }
        }
    }

    fn handle_op_completed(&mut self, completed: OpCompleted) {
        let OpCompleted {
            process_id,
            op,
            task,
            result,
            batch_id,
        } = completed;

        let Some(instance) = self.processes.get_mut(&process_id) else {
            warn!("OpCompleted for unknown monitor {}, task dropped", process_id);
            return;
        };

        debug!(
            "Operation {} completed for monitor {}: {:?}",
            op.name(),
            process_id,
            result.is_ok()
        );

        instance.task = task;
        let previous_health = instance.health;
        let (answer, event) = Self::apply_completion(instance, op, result);
        Self::emit_health_change(&self.event_tx, instance, previous_health);
        let in_flight = instance.in_flight.take();
        let _ = self.event_tx.send(event);

        let (resp, batch_id) = match in_flight {
            Some(in_flight) => (in_flight.resp, in_flight.batch_id.or(batch_id)),
            None => (None, batch_id),
        };
        self.finish_op(&process_id, op, resp, batch_id, answer);
    }

    /// Update status, health and counters from a job result.
    fn apply_completion(
        instance: &mut ManagedProcess,
        op: OpKind,
        result: Result<u32>,
    ) -> (Result<RecoveryOutcome>, ProcessEvent) {
        let id = instance.id.clone();
        let now = Utc::now();

        match (op, result) {
            (OpKind::Stop { .. }, Ok(_)) => {
                log_transition(&id, instance.state.transition_to_stopped());
                instance.health = HealthStatus::Unknown;
                info!("Monitor {} stopped", id);
                (Ok(RecoveryOutcome::NotNeeded), ProcessEvent::Stopped { id })
            }
            (_, Ok(attempt)) => {
                enter_running(instance);
                instance.health = HealthStatus::Healthy;
                instance.last_check = Some(now);
                match op {
                    OpKind::Start => instance.restart_count = attempt,
                    _ => {
                        instance.restart_count = instance
                            .restart_count
                            .saturating_add(attempt)
                            .saturating_add(1);
                        instance.ledger.reset();
                    }
                }
                if op == OpKind::Recover {
                    info!("Monitor {} recovered", id);
                    (Ok(RecoveryOutcome::Recovered), ProcessEvent::Recovered { id })
                } else {
                    let restart_count = instance.restart_count;
                    (
                        Ok(RecoveryOutcome::NotNeeded),
                        ProcessEvent::Started { id, restart_count },
                    )
                }
            }
            (_, Err(e)) => {
                let reason = e.to_string();
                enter_error(instance, reason.clone());
                instance.health = HealthStatus::Unhealthy;
                instance.last_check = Some(now);
                if !matches!(e, ProcessError::RestartFailed { .. }) {
                    instance.ledger.record(reason.as_str());
                }
                instance.task = None;

                match op {
                    OpKind::Recover => {
                        warn!("Recovery of monitor {} failed: {}", id, reason);
                        (
                            Ok(RecoveryOutcome::Failed(reason.clone())),
                            ProcessEvent::RecoveryFailed { id, reason },
                        )
                    }
                    OpKind::Stop { .. } => (Err(e), ProcessEvent::StopFailed { id, reason }),
                    _ => (Err(e), ProcessEvent::StartFailed { id, reason }),
                }
            }
        }
    }

    /// Answer the caller, settle batch accounting and move on to the next queued op.
    fn finish_op(
        &mut self,
        process_id: &str,
        op: OpKind,
        resp: Option<OpResponder>,
        batch_id: Option<u64>,
        answer: Result<RecoveryOutcome>,
    ) {
        let failed = answer.is_err();
        match resp {
            Some(resp) => Self::send_op_resp(resp, answer),
            None => match &answer {
                Err(e) => debug!("{} for {} failed: {}", op.name(), process_id, e),
                Ok(RecoveryOutcome::Failed(reason)) => {
                    debug!("{} for {} not performed: {}", op.name(), process_id, reason)
                }
                Ok(_) => {}
            },
        }

        if let Some(batch_id) = batch_id {
            self.batch_op_completed(batch_id, failed.then(|| process_id.to_string()));
        }

        // A stopped monitor is discarded unless more work is queued for it
        if op == (OpKind::Stop { discard: true }) && !failed {
            let idle = self
                .processes
                .get(process_id)
                .map(|inst| !inst.is_busy() && inst.pending_ops.is_empty())
                .unwrap_or(false);
            if idle {
                self.processes.remove(process_id);
                info!("Monitor {} removed", process_id);
                return;
            }
        }

        self.start_next_queued_op(process_id);
    }

    fn start_next_queued_op(&mut self, process_id: &str) {
        let next_op = {
            let Some(instance) = self.processes.get_mut(process_id) else {
                return;
            };
            if instance.is_busy() {
                return;
            }
            let op = instance.pending_ops.pop_front();
            if op.is_some() {
                self.total_pending_ops = self.total_pending_ops.saturating_sub(1);
            }
            op
        };

        if let Some(op_request) = next_op {
            debug!(
                "Starting queued {} operation for monitor {}",
                op_request.kind.name(),
                process_id
            );
            self.start_op_now(
                process_id,
                op_request.kind,
                op_request.factory,
                op_request.resp,
                op_request.batch_id,
            );
        }
    }

    /// Fail every queued operation for a monitor. Returns the number drained.
    fn fail_and_drain_pending_ops(&mut self, process_id: &str, err: ProcessError) -> usize {
        let Some(instance) = self.processes.get_mut(process_id) else {
            return 0;
        };

        let pending: Vec<OpRequest> = instance.pending_ops.drain(..).collect();
        if pending.is_empty() {
            return 0;
        }

        warn!(
            "Draining {} pending op(s) for monitor '{}': {}",
            pending.len(),
            process_id,
            err
        );
        self.total_pending_ops = self.total_pending_ops.saturating_sub(pending.len());

        let drained = pending.len();
        for op_request in pending {
            if let Some(resp) = op_request.resp {
                Self::send_op_resp(resp, Err(err.clone()));
            }
            if let Some(batch_id) = op_request.batch_id {
                self.batch_op_completed(batch_id, Some(process_id.to_string()));
            }
        }

        drained
    }

    fn send_op_resp(resp: OpResponder, result: Result<RecoveryOutcome>) {
        match resp {
            OpResponder::Unit(tx) => {
                let _ = tx.send(result.map(|_| ()));
            }
            OpResponder::Recovery(tx) => {
                let _ = tx.send(result);
            }
        }
    }

    fn batch_op_completed(&mut self, batch_id: u64, failed_process_id: Option<String>) {
        let Some(batch) = self.pending_batches.get_mut(&batch_id) else {
            debug!("batch_op_completed called for unknown batch_id {}", batch_id);
            return;
        };

        match batch.pending_count.checked_sub(1) {
            Some(next) => batch.pending_count = next,
            None => {
                error!("Batch {} pending_count underflow (double-complete?)", batch_id);
                batch.pending_count = 0;
            }
        }
        if let Some(id) = failed_process_id {
            batch.failed_process_ids.push(id);
        }
        if batch.pending_count > 0 {
            return;
        }

        let Some(batch) = self.pending_batches.remove(&batch_id) else {
            return;
        };
        let result = if batch.failed_process_ids.is_empty() {
            Ok(())
        } else {
            Err(ProcessError::stop_failed(
                "process-manager",
                format!(
                    "failed to stop monitor(s): {}",
                    batch.failed_process_ids.join(", ")
                ),
            ))
        };

        if matches!(self.state, ProcessManagerState::Stopping) {
            self.state = ProcessManagerState::Stopped;
            info!("Process manager shut down");
        }

        if let Some(resp) = batch.resp {
            let _ = resp.send(result);
        }
    }

    /// True when nothing is queued, in flight or waiting on a batch.
    fn is_fully_drained(&self) -> bool {
        self.pending_batches.is_empty()
            && self
                .processes
                .values()
                .all(|inst| !inst.is_busy() && inst.pending_ops.is_empty())
    }

    /// Stop every monitor (non-blocking, idempotent).
    fn initiate_shutdown(&mut self, resp: Option<oneshot::Sender<Result<()>>>) {
        if matches!(
            self.state,
            ProcessManagerState::Stopping | ProcessManagerState::Stopped
        ) {
            debug!("Shutdown already in progress or completed ({:?})", self.state);
            if let Some(resp) = resp {
                let _ = resp.send(Ok(()));
            }
            return;
        }

        info!("Shutting down process manager");
        self.state = ProcessManagerState::Stopping;

        let process_ids = self.sorted_ids();
        if process_ids.is_empty() {
            self.state = ProcessManagerState::Stopped;
            if let Some(resp) = resp {
                let _ = resp.send(Ok(()));
            }
            info!("Process manager shut down (no monitors to stop)");
            return;
        }

        let batch_id = next_batch_id();
        self.pending_batches.insert(
            batch_id,
            PendingBatch {
                pending_count: process_ids.len(),
                failed_process_ids: Vec::new(),
                resp,
            },
        );

        for process_id in process_ids {
            self.schedule_op(
                process_id,
                OpKind::Stop { discard: false },
                None,
                None,
                Some(batch_id),
            );
        }
    }

    /// Periodic health poll: evaluate idle monitors, publish a status report,
    /// and queue recovery for unhealthy ones when auto-recovery is on.
    fn run_health_poll(&mut self) {
        if !self.health_monitoring || self.processes.is_empty() {
            return;
        }

        let mut results = Vec::with_capacity(self.processes.len());
        let mut unhealthy = Vec::new();

        for id in self.sorted_ids() {
            let Some(instance) = self.processes.get_mut(&id) else {
                continue;
            };
            let result = if instance.is_busy() {
                instance.health_snapshot()
            } else {
                let previous_health = instance.health;
                let result = Self::evaluate_health(instance, &self.policy);
                Self::emit_health_change(&self.event_tx, instance, previous_health);
                if result.health == HealthStatus::Unhealthy && instance.pending_ops.is_empty() {
                    unhealthy.push(id);
                }
                result
            };
            results.push(result);
        }

        debug!(
            "Health poll: {} monitor(s), {} unhealthy",
            results.len(),
            unhealthy.len()
        );
        let _ = self.event_tx.send(ProcessEvent::StatusReport { results });

        if self.auto_recover {
            for id in unhealthy {
                self.schedule_op(id, OpKind::Recover, None, None, None);
            }
        }
    }

    fn check_health(&mut self, id: &str) -> Result<HealthCheckResult> {
        let instance = self
            .processes
            .get_mut(id)
            .ok_or_else(|| ProcessError::not_found(id))?;

        if instance.is_busy() {
            return Ok(instance.health_snapshot());
        }

        let previous_health = instance.health;
        let result = Self::evaluate_health(instance, &self.policy);
        Self::emit_health_change(&self.event_tx, instance, previous_health);
        Ok(result)
    }

    /// Derive health from status, task state and error count, and store it.
    fn evaluate_health(instance: &mut ManagedProcess, policy: &HealthPolicy) -> HealthCheckResult {
        let task_state = instance
            .task
            .as_ref()
            .map(MonitorTask::state)
            .unwrap_or(TaskState::Missing);
        let errors = instance.ledger.snapshot();
        let status = instance.status();
        let (health, reason) = policy.evaluate(status, &task_state, errors.error_count);
        let now = Utc::now();

        instance.health = health;
        instance.last_check = Some(now);

        HealthCheckResult {
            id: instance.id.clone(),
            status,
            health,
            error_count: errors.error_count,
            last_error: reason.or(errors.last_error),
            checked_at: now,
        }
    }

    fn emit_health_change(
        event_tx: &broadcast::Sender<ProcessEvent>,
        instance: &ManagedProcess,
        previous: HealthStatus,
    ) {
        if instance.health == previous {
            return;
        }
        debug!(
            "Monitor {} health changed: {} -> {}",
            instance.id, previous, instance.health
        );
        let _ = event_tx.send(ProcessEvent::HealthChanged {
            id: instance.id.clone(),
            from: previous,
            to: instance.health,
        });
    }

    fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.processes.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn all_process_info(&self) -> Vec<ProcessInfo> {
        self.sorted_ids()
            .iter()
            .filter_map(|id| self.processes.get(id).map(ManagedProcess::info))
            .collect()
    }
}

/// Walk the state machine from wherever a job left it to Running.
fn enter_running(instance: &mut ManagedProcess) {
    if instance.status() == ProcessStatus::Stopping {
        log_transition(&instance.id, instance.state.transition_to_stopped());
    }
    if instance.status() != ProcessStatus::Starting {
        log_transition(&instance.id, instance.state.transition_to_starting());
    }
    log_transition(&instance.id, instance.state.transition_to_running());
}

fn enter_error(instance: &mut ManagedProcess, reason: String) {
    // Stopped -> Error is not a valid transition
    if instance.status() == ProcessStatus::Stopped {
        log_transition(&instance.id, instance.state.transition_to_starting());
    }
    log_transition(&instance.id, instance.state.transition_to_error(reason));
}

fn log_transition(id: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("Unexpected state transition for {}: {}", id, e);
    }
}
