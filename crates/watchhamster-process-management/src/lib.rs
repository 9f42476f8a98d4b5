//! # WatchHamster Process Management
//!
//! Supervision of WatchHamster monitor tasks.
//!
//! This crate provides:
//! - [`ProcessManager`] - actor-based supervisor: start with bounded retries,
//!   health checks, auto-recovery and a periodic health poll
//! - Monitor factories and the [`MonitorContext`] handed to every task
//! - [`RestartPolicy`] and [`CircuitBreaker`]
//! - YAML configuration and validation

pub mod config;
pub mod lifecycle;
pub mod manager;
pub mod monitors;

// Re-export main types
pub use config::{
    BackupSectionConfig, CalendarConfig, HolidayConfig, MonitorConfig, NotificationConfig,
    ProbeConfig, SupervisionConfig, WatchHamsterConfig, WatchHamsterOptions,
};
pub use lifecycle::{CircuitBreaker, RestartPolicy};
pub use manager::{
    ManagerOptions, ProcessEvent, ProcessInfo, ProcessManager, ProcessManagerState,
    RecoveryOutcome,
};
pub use monitors::{
    monitor_fn, probe_monitor, ErrorLedger, ErrorSnapshot, MonitorContext, MonitorFactory,
    MonitorFuture, SharedFactory,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
