//! # WatchHamster Common
//!
//! Error types and identifiers shared by every WatchHamster crate.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{Error, ProcessError, ProcessResult, Result, ResultExt};
pub use types::{MonitorId, MonitoringMode};
