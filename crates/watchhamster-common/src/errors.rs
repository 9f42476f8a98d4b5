//! Error types for WatchHamster.
//!
//! Two families live here:
//! - [`Error`] for storage, calendar and configuration level failures.
//! - [`ProcessError`] for supervision of monitor tasks. It is `Clone` so a
//!   single failure can be fanned out to every queued caller.
//!
//! ```
//! use watchhamster_common::{Error, Result, ResultExt};
//!
//! fn load() -> Result<()> {
//!     Err(Error::not_found("state file"))
//! }
//!
//! fn caller() -> Result<()> {
//!     load().context("Failed to restore state")
//! }
//! # assert!(caller().is_err());
//! ```

use thiserror::Error;

/// Result type alias for WatchHamster operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for WatchHamster operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A requested resource was not found.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Invalid input or configuration.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A date string could not be interpreted.
    #[error("Invalid date '{input}': {reason}")]
    InvalidDate { input: String, reason: String },

    /// A file did not match its recorded checksum.
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Internal error (shouldn't happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<Error>,
    },
}

impl Error {
    /// Creates a NotFound error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an InvalidDate error.
    pub fn invalid_date(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDate {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn checksum_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Adds context to an error.
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }
}

/// Convenience methods for Result types.
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(message))
    }
}

// ==============================================================================
// Supervision Errors
// ==============================================================================

/// Errors raised while supervising monitor tasks.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("Monitor not found: {id}")]
    NotFound { id: String },

    #[error("Monitor already running: {id} (state: {state})")]
    AlreadyRunning { id: String, state: String },

    #[error("Monitor stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Monitor timeout: {id} - {operation}")]
    Timeout { id: String, operation: String },

    #[error("Monitor state error: {id} - cannot move to {expected} from {actual}")]
    InvalidState {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Monitor restart failed: {id} - attempt {attempt} of {max_attempts}: {reason}")]
    RestartFailed {
        id: String,
        attempt: u32,
        max_attempts: u32,
        reason: String,
    },

    #[error("Monitor operation not allowed: {id} - {operation} (state: {state})")]
    OperationNotAllowed {
        id: String,
        operation: String,
        state: String,
    },

    #[error("Operation queue full for monitor '{id}' (limit: {limit})")]
    QueueFull { id: String, limit: usize },

    #[error("Task panicked for monitor '{id}': {message}")]
    TaskPanic { id: String, message: String },

    #[error("Process manager unavailable: {reason}")]
    ManagerUnavailable { reason: String },
}

impl ProcessError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn already_running(id: impl Into<String>, state: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            id: id.into(),
            state: state.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            id: id.into(),
            operation: operation.into(),
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn restart_failed(
        id: impl Into<String>,
        attempt: u32,
        max_attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::RestartFailed {
            id: id.into(),
            attempt,
            max_attempts,
            reason: reason.into(),
        }
    }

    pub fn operation_not_allowed(
        id: impl Into<String>,
        operation: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self::OperationNotAllowed {
            id: id.into(),
            operation: operation.into(),
            state: state.into(),
        }
    }

    pub fn queue_full(id: impl Into<String>, limit: usize) -> Self {
        Self::QueueFull {
            id: id.into(),
            limit,
        }
    }

    pub fn task_panic(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskPanic {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn manager_unavailable(reason: impl Into<String>) -> Self {
        Self::ManagerUnavailable {
            reason: reason.into(),
        }
    }
}

/// Result type for supervision operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;
