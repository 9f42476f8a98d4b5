//! # WatchHamster State File
//!
//! Persistence of orchestrator state between runs.
//!
//! State is written as pretty JSON through a temporary file that is renamed
//! into place, so a crash mid-write never leaves a truncated state file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use watchhamster_common::{Error, MonitoringMode, Result, ResultExt};
use watchhamster_monitoring::HealthStatus;
use watchhamster_process_state::ProcessStatus;

/// Default state file location, relative to the working directory
pub const DEFAULT_STATE_FILE: &str = "state/watchhamster_state.json";

/// Persisted snapshot of a single monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub status: ProcessStatus,
    pub health: HealthStatus,
    pub restart_count: u32,
    pub error_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Bookkeeping attached to every save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub last_save: DateTime<Utc>,
    pub version: String,
}

impl Default for StateMetadata {
    fn default() -> Self {
        Self {
            last_save: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Orchestrator state persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    pub watchhamster_running: bool,
    pub mode: MonitoringMode,
    pub start_time: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub last_error: Option<String>,
    #[serde(default)]
    pub individual_monitors: BTreeMap<String, MonitorSnapshot>,
    #[serde(default)]
    pub metadata: StateMetadata,
}

impl SavedState {
    pub fn new(mode: MonitoringMode) -> Self {
        Self {
            watchhamster_running: false,
            mode,
            start_time: None,
            error_count: 0,
            last_error: None,
            individual_monitors: BTreeMap::new(),
            metadata: StateMetadata::default(),
        }
    }
}

/// Location of the state file and the operations on it
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save state to disk (atomic write). Refreshes `metadata.last_save`.
    pub async fn save(&self, state: &SavedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context(format!("Failed to create state directory {}", parent.display()))?;
            }
        }

        let mut state = state.clone();
        state.metadata.last_save = Utc::now();
        let json = serde_json::to_string_pretty(&state)?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .context(format!("Failed to write {}", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .context(format!("Failed to replace {}", self.path.display()))?;

        debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    /// Load state from disk. A missing file yields `None`.
    pub async fn load(&self) -> Result<Option<SavedState>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No saved state at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).context(format!("Failed to read {}", self.path.display()))
            }
        };

        let state: SavedState = serde_json::from_str(&content)
            .context(format!("Failed to parse {}", self.path.display()))?;

        info!(
            "Loaded saved state from {} ({} monitors, last saved {})",
            self.path.display(),
            state.individual_monitors.len(),
            state.metadata.last_save
        );
        Ok(Some(state))
    }

    /// Delete the state file if it exists.
    pub async fn delete(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}
