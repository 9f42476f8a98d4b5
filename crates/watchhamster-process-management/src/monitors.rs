//! Monitor tasks and the context they run with.
//!
//! A monitor is any future returning `anyhow::Result<()>`. The supervisor
//! builds a fresh future from a [`MonitorFactory`] on every (re)start and
//! hands it a [`MonitorContext`] for reporting errors. Returning `Err`
//! ends the task and records the error.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use watchhamster_common::MonitorId;
use watchhamster_monitoring::{ProbeMonitor, ProbeMonitorConfig, TaskState};

pub type MonitorFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Builds the future backing a monitor
pub trait MonitorFactory: Send + Sync {
    fn create(&self, ctx: MonitorContext) -> MonitorFuture;
}

impl<F, Fut> MonitorFactory for F
where
    F: Fn(MonitorContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn create(&self, ctx: MonitorContext) -> MonitorFuture {
        Box::pin(self(ctx))
    }
}

pub type SharedFactory = Arc<dyn MonitorFactory>;

/// Wrap a closure as a shareable factory.
///
/// ```
/// use watchhamster_process_management::monitor_fn;
///
/// let factory = monitor_fn(|ctx| async move {
///     if ctx.error_count() > 10 {
///         return Err(anyhow::anyhow!("giving up"));
///     }
///     Ok::<(), anyhow::Error>(())
/// });
/// # drop(factory);
/// ```
pub fn monitor_fn<F, Fut>(f: F) -> SharedFactory
where
    F: Fn(MonitorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(f)
}

/// Factory running a [`ProbeMonitor`]; each failed probe counts as a monitor error.
pub fn probe_monitor(config: ProbeMonitorConfig) -> SharedFactory {
    monitor_fn(move |ctx: MonitorContext| {
        let config = config.clone();
        async move {
            let mut monitor = ProbeMonitor::new(ctx.id(), config);

            let failures = ctx.clone();
            monitor.set_failure_callback(move |reason| failures.record_error(reason));

            let id = ctx.id().to_string();
            monitor.set_recovery_callback(move || info!("Probe target for {} is reachable again", id));

            monitor.run().await.map_err(anyhow::Error::from)
        }
    })
}

/// Errors recorded against a monitor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSnapshot {
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Error counter shared between the supervisor and a monitor's tasks.
/// Survives restarts; only recovery resets it.
#[derive(Debug, Default)]
pub struct ErrorLedger {
    inner: Mutex<ErrorSnapshot>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error and return the new count
    pub fn record(&self, error: impl Into<String>) -> u32 {
        let mut inner = self.inner.lock();
        inner.error_count = inner.error_count.saturating_add(1);
        inner.last_error = Some(error.into());
        inner.last_error_at = Some(Utc::now());
        inner.error_count
    }

    pub fn error_count(&self) -> u32 {
        self.inner.lock().error_count
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn snapshot(&self) -> ErrorSnapshot {
        self.inner.lock().clone()
    }

    /// Clear the counter. The last error message is kept for diagnostics.
    pub fn reset(&self) {
        self.inner.lock().error_count = 0;
    }
}

/// Handle given to every monitor task
#[derive(Debug, Clone)]
pub struct MonitorContext {
    id: MonitorId,
    ledger: Arc<ErrorLedger>,
}

impl MonitorContext {
    pub fn new(id: impl Into<MonitorId>, ledger: Arc<ErrorLedger>) -> Self {
        Self {
            id: id.into(),
            ledger,
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn monitor_id(&self) -> &MonitorId {
        &self.id
    }

    pub fn record_error(&self, error: impl fmt::Display) {
        let count = self.ledger.record(error.to_string());
        debug!("Monitor {} recorded error #{}: {}", self.id, count, error);
    }

    pub fn error_count(&self) -> u32 {
        self.ledger.error_count()
    }

    pub fn last_error(&self) -> Option<String> {
        self.ledger.last_error()
    }
}

#[derive(Debug, Clone)]
enum TaskExit {
    Completed,
    Failed(String),
}

/// A spawned monitor task. Dropping it aborts the task.
pub(crate) struct MonitorTask {
    handle: JoinHandle<()>,
    exit: Arc<Mutex<Option<TaskExit>>>,
}

impl MonitorTask {
    pub(crate) fn spawn(factory: &dyn MonitorFactory, ctx: MonitorContext) -> Self {
        let exit = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&exit);
        let future = factory.create(ctx.clone());

        let handle = tokio::spawn(async move {
            match future.await {
                Ok(()) => {
                    debug!("Monitor task {} finished", ctx.id());
                    *slot.lock() = Some(TaskExit::Completed);
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    warn!("Monitor task {} failed: {}", ctx.id(), message);
                    ctx.record_error(&message);
                    *slot.lock() = Some(TaskExit::Failed(message));
                }
            }
        });

        Self { handle, exit }
    }

    pub(crate) fn state(&self) -> TaskState {
        if !self.handle.is_finished() {
            return TaskState::Alive;
        }

        match self.exit.lock().clone() {
            Some(TaskExit::Completed) => TaskState::Completed,
            Some(TaskExit::Failed(reason)) => TaskState::Failed(reason),
            None => TaskState::Vanished,
        }
    }

    /// Cancel the task and wait up to `timeout` for it to finish.
    /// Returns false when the task did not finish in time.
    pub(crate) async fn stop(mut self, timeout: Duration) -> bool {
        self.handle.abort();
        tokio::time::timeout(timeout, &mut self.handle).await.is_ok()
    }
}

impl Drop for MonitorTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
