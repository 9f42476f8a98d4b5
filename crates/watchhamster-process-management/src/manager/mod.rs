//! Actor-based monitor supervision
//!
//! - A single event loop owns every supervised monitor record
//! - [`ProcessManager`] is a cloneable handle that sends commands over a channel
//! - Lifecycle work (start with retries, stop, restart, recovery) runs in an
//!   OpRunner worker pool and reports completion back to the actor
//!
//! ## Actor Lifecycle
//!
//! The actor keeps running after `shutdown` so state can still be queried.
//! It terminates once every `ProcessManager` handle is dropped; dropping the
//! last handle also stops every monitor.
//!
//! After shutdown:
//! - `get_manager_state()` returns `Stopped`
//! - `start()`, `restart()` and `auto_recover()` return `OperationNotAllowed`
//! - `stop()`, health checks and queries still work
//!
//! ## Health Poll
//!
//! Every `health_check_interval` the actor evaluates all idle monitors,
//! broadcasts a `StatusReport`, and, when auto-recovery is on, queues a
//! recovery for each unhealthy monitor. The select loop is `biased`:
//! completions first, then commands, then the poll tick. Under load a poll
//! may be skipped (`MissedTickBehavior::Skip`).
//!
//! ## Per-Monitor Operation Queueing
//!
//! Operations on a busy monitor are queued FIFO and run when the current one
//! completes, so each monitor sees its operations in order while different
//! monitors proceed concurrently.
//!
//! | Layer | Capacity | Saturation Behavior |
//! |-------|----------|---------------------|
//! | Command channel | 32 | Caller's `send()` awaits |
//! | Job channel (OpRunner) | 64 | `QueueFull` |
//! | Per-monitor pending ops | 32 | `QueueFull` |
//! | Global pending ops | 1024 | `QueueFull` |
//! | Event broadcast | 256 | Slow subscribers lag |

mod actor;
mod commands;
mod handle;
mod ops;

mod types;

#[cfg(test)]
mod tests;

pub use handle::ProcessManager;
pub use types::{ManagerOptions, ProcessEvent, ProcessInfo, ProcessManagerState, RecoveryOutcome};

use actor::ProcessManagerActor;
use commands::ManagerCommand;
use ops::OpCompleted;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

impl ProcessManager {
    /// Spawn the supervision actor. Must be called inside a Tokio runtime.
    pub fn new(options: ManagerOptions) -> Self {
        info!(
            "Creating process manager (health check every {:?}, auto-recover: {})",
            options.health_check_interval, options.auto_recover
        );

        let (cmd_tx, cmd_rx) = mpsc::channel::<ManagerCommand>(32);
        let (completed_tx, completed_rx) = mpsc::channel::<OpCompleted>(256);
        let (event_tx, _) = broadcast::channel::<ProcessEvent>(EVENT_CHANNEL_CAPACITY);

        let actor = ProcessManagerActor::new(options, completed_tx, event_tx.clone());
        tokio::spawn(actor.run(cmd_rx, completed_rx));

        ProcessManager { cmd_tx, event_tx }
    }
}
