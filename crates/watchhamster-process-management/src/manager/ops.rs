//! Operation runner for monitor lifecycle work.
//!
//! Start, stop, restart and recovery sleep and wait on tasks, so they run
//! in worker tasks instead of the actor. Workers handle panics and always
//! report completion back to the actor.

use super::types::{OpKind, Result};
use crate::config::SupervisionConfig;
use crate::lifecycle::RestartPolicy;
use crate::monitors::{ErrorLedger, MonitorContext, MonitorTask, SharedFactory};
use futures::future::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use watchhamster_common::ProcessError;
use watchhamster_monitoring::TaskState;
use tracing::{debug, error, info, warn};

/// Slack added on top of the worst-case duration of an operation
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the OpRunner job submission channel.
pub(super) const JOB_QUEUE_CAPACITY: usize = 64;

/// A job to be executed by the operation runner
pub(super) struct Job {
    pub process_id: String,
    pub op: OpKind,
    /// Task taken from the instance; `None` when nothing is running
    pub task: Option<MonitorTask>,
    pub factory: SharedFactory,
    pub ledger: Arc<ErrorLedger>,
    pub settings: SupervisionConfig,
    /// Batch ID for shutdown
    pub batch_id: Option<u64>,
}

/// Result of an operation execution (sent back to actor)
pub(super) struct OpCompleted {
    pub process_id: String,
    pub op: OpKind,
    /// Task to store back on the instance. None if stopped, failed or lost to a panic.
    pub task: Option<MonitorTask>,
    /// Index of the start attempt that succeeded (0 for stop)
    pub result: Result<u32>,
    pub batch_id: Option<u64>,
}

/// Operation runner that bounds concurrent lifecycle work.
pub(super) struct OpRunner {
    pub job_tx: mpsc::Sender<Job>,
}

impl OpRunner {
    /// Create a new operation runner running at most `concurrency` jobs at once.
    pub fn new(concurrency: usize, completed_tx: mpsc::Sender<OpCompleted>) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>(JOB_QUEUE_CAPACITY);
        let semaphore = Arc::new(Semaphore::new(concurrency));

        tokio::spawn(Self::dispatcher_loop(
            job_rx,
            semaphore,
            completed_tx,
            concurrency,
        ));

        debug!("OpRunner started with {} workers", concurrency);

        OpRunner { job_tx }
    }

    /// Receives jobs, enforces concurrency via semaphore, tracks tasks in a JoinSet.
    async fn dispatcher_loop(
        mut job_rx: mpsc::Receiver<Job>,
        semaphore: Arc<Semaphore>,
        completed_tx: mpsc::Sender<OpCompleted>,
        max_in_flight: usize,
    ) {
        let mut join_set: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                maybe_job = job_rx.recv() => {
                    let Some(job) = maybe_job else {
                        debug!("OpRunner dispatcher: channel closed, draining tasks");
                        break;
                    };

                    let permit = match Arc::clone(&semaphore).acquire_owned().await {
                        Ok(p) => p,
                        Err(e) => {
                            error!("OpRunner semaphore closed unexpectedly: {}", e);
                            // The job cannot run, but the actor still needs its completion
                            let completed = OpCompleted {
                                result: Err(ProcessError::manager_unavailable(format!(
                                    "operation runner semaphore closed: {}",
                                    e
                                ))),
                                process_id: job.process_id,
                                op: job.op,
                                task: job.task,
                                batch_id: job.batch_id,
                            };
                            if completed_tx.send(completed).await.is_err() {
                                error!("Failed to send OpCompleted after semaphore failure: completion channel closed");
                            }
                            continue;
                        }
                    };

                    let completed_tx = completed_tx.clone();
                    join_set.spawn(async move {
                        let _permit = permit;
                        let completed = Self::execute_job_with_panic_recovery(job).await;
                        if completed_tx.send(completed).await.is_err() {
                            error!("Failed to send OpCompleted: completion channel closed");
                        }
                    });

                    // Finished tasks stay in the JoinSet until joined
                    while join_set.len() > max_in_flight {
                        let _ = join_set.join_next().await;
                    }
                }
                join_res = join_set.join_next(), if !join_set.is_empty() => {
                    if let Some(Err(e)) = join_res {
                        if e.is_panic() {
                            error!("OpRunner worker task panicked unexpectedly: {}", e);
                        } else {
                            warn!("OpRunner worker task cancelled: {}", e);
                        }
                    }
                }
            }
        }

        while let Some(res) = join_set.join_next().await {
            if let Err(e) = res {
                warn!("OpRunner worker task ended abnormally during drain: {}", e);
            }
        }
    }

    /// Execute a job with panic recovery. Always returns OpCompleted.
    async fn execute_job_with_panic_recovery(job: Job) -> OpCompleted {
        let process_id = job.process_id.clone();
        let op = job.op;
        let batch_id = job.batch_id;

        let result = AssertUnwindSafe(Self::execute_job_safe(job))
            .catch_unwind()
            .await;

        match result {
            Ok(completed) => completed,
            Err(panic_info) => {
                let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };

                error!(
                    "Job panicked for monitor {} during {}: {}",
                    process_id,
                    op.name(),
                    panic_msg
                );

                OpCompleted {
                    process_id: process_id.clone(),
                    op,
                    task: None,
                    result: Err(ProcessError::task_panic(process_id, panic_msg)),
                    batch_id,
                }
            }
        }
    }

    /// Execute a job under its deadline.
    async fn execute_job_safe(mut job: Job) -> OpCompleted {
        let deadline = op_deadline(&job.op, &job.settings);

        let result = match timeout(deadline, Self::execute_job_inner(&mut job)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Operation {} timed out for monitor {} after {:?}",
                    job.op.name(),
                    job.process_id,
                    deadline
                );
                Err(ProcessError::timeout(&job.process_id, job.op.name()))
            }
        };

        OpCompleted {
            process_id: job.process_id,
            op: job.op,
            task: job.task,
            result,
            batch_id: job.batch_id,
        }
    }

    async fn execute_job_inner(job: &mut Job) -> Result<u32> {
        match job.op {
            OpKind::Start => {
                info!("Starting monitor: {}", job.process_id);
                Self::start_with_retries(job).await
            }
            OpKind::Stop { .. } => {
                info!("Stopping monitor: {}", job.process_id);
                Self::stop_task(job).await.map(|()| 0)
            }
            OpKind::Restart | OpKind::Recover => {
                info!("Cycling monitor {} ({})", job.process_id, job.op.name());
                Self::stop_task(job).await?;
                tokio::time::sleep(job.settings.restart_pause).await;
                Self::start_with_retries(job).await
            }
        }
    }

    async fn stop_task(job: &mut Job) -> Result<()> {
        let Some(task) = job.task.take() else {
            debug!("Monitor {} has no running task", job.process_id);
            return Ok(());
        };

        if task.stop(job.settings.stop_timeout).await {
            Ok(())
        } else {
            error!(
                "Monitor {} did not stop within {:?}",
                job.process_id, job.settings.stop_timeout
            );
            Err(ProcessError::timeout(&job.process_id, "stop"))
        }
    }

    /// Spawn the monitor until it survives the settle period or attempts run out.
    async fn start_with_retries(job: &mut Job) -> Result<u32> {
        let policy = RestartPolicy::from_config(&job.settings);
        let mut attempt = 0u32;

        loop {
            let ctx = MonitorContext::new(job.process_id.as_str(), Arc::clone(&job.ledger));
            let task = MonitorTask::spawn(job.factory.as_ref(), ctx);
            tokio::time::sleep(job.settings.startup_settle).await;

            let reason = match task.state() {
                TaskState::Alive | TaskState::Completed => {
                    info!(
                        "Monitor {} started on attempt {}/{}",
                        job.process_id,
                        attempt + 1,
                        policy.max_attempts
                    );
                    job.task = Some(task);
                    return Ok(attempt);
                }
                // Already recorded by the task itself
                TaskState::Failed(reason) => reason,
                other => {
                    let reason = format!("monitor task ended during startup ({:?})", other);
                    job.ledger.record(reason.as_str());
                    reason
                }
            };
            drop(task);

            if !policy.has_attempt_after(attempt) {
                error!(
                    "Monitor {} failed to start after {} attempts: {}",
                    job.process_id, policy.max_attempts, reason
                );
                return Err(ProcessError::restart_failed(
                    &job.process_id,
                    attempt + 1,
                    policy.max_attempts,
                    reason,
                ));
            }

            let delay = policy.delay_after(attempt);
            warn!(
                "Monitor {} start attempt {}/{} failed: {}; retrying in {:?}",
                job.process_id,
                attempt + 1,
                policy.max_attempts,
                reason,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Run one job through the dispatcher with a closed semaphore.
    #[cfg(test)]
    pub(super) async fn test_run_job_with_closed_semaphore(
        job: Job,
        completed_tx: mpsc::Sender<OpCompleted>,
    ) {
        let (job_tx, job_rx) = mpsc::channel::<Job>(1);
        let semaphore = Arc::new(Semaphore::new(1));
        semaphore.close();

        let _ = job_tx.send(job).await;
        drop(job_tx);

        Self::dispatcher_loop(job_rx, semaphore, completed_tx, 1).await;
    }
}

/// Worst-case duration of `op` plus slack
fn op_deadline(op: &OpKind, settings: &SupervisionConfig) -> Duration {
    let policy = RestartPolicy::from_config(settings);
    let start_budget = (0..policy.max_attempts).fold(Duration::ZERO, |acc, attempt| {
        acc.saturating_add(settings.startup_settle)
            .saturating_add(policy.delay_after(attempt))
    });

    let work = match op {
        OpKind::Start => start_budget,
        OpKind::Stop { .. } => settings.stop_timeout,
        OpKind::Restart | OpKind::Recover => settings
            .stop_timeout
            .saturating_add(settings.restart_pause)
            .saturating_add(start_budget),
    };

    DEFAULT_OP_TIMEOUT.saturating_add(work)
}
