//! # WatchHamster Core
//!
//! The orchestrator tying supervision, notifications and persistence
//! together:
//!
//! - [`WatchHamsterCore`] selects monitors per [`MonitoringMode`] and runs
//!   them under a `ProcessManager`
//! - supervision events are relayed to the webhook notifier
//! - error count, last error and per-monitor snapshots are saved to the
//!   JSON state file and restored on `initialize`
//!
//! [`MonitoringMode`]: watchhamster_common::MonitoringMode

pub mod error;
pub mod events;
pub mod modes;
pub mod setup;
pub mod status;
mod watchhamster;

#[cfg(test)]
mod tests;

pub use error::{CoreError, CoreResult};
pub use events::to_notify_event;
pub use modes::{select_monitors, MonitorSelection};
pub use status::{SystemStatus, SystemStatusInfo};
pub use watchhamster::WatchHamsterCore;
