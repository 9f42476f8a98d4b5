//! Backup index persisted under the backup root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;
use watchhamster_common::{Result, ResultExt};

/// File name of the index under the backup root
pub const METADATA_FILE: &str = "backup_metadata.json";

/// Backups whose name contains this marker are never pruned or auto-selected
pub const EMERGENCY_MARKER: &str = "emergency";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Completed,
    Failed,
}

/// One backup directory and what it contains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_id: String,
    pub backup_name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub backup_path: PathBuf,
    #[serde(default)]
    pub backed_up_files: Vec<String>,
    /// Relative path → hex SHA-256
    #[serde(default)]
    pub file_checksums: HashMap<String, String>,
    pub file_count: usize,
    pub total_size: u64,
    pub status: BackupStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackupRecord {
    pub fn is_emergency(&self) -> bool {
        self.backup_name.contains(EMERGENCY_MARKER)
    }

    pub fn is_completed(&self) -> bool {
        self.status == BackupStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub rollback_id: String,
    pub source_backup_id: String,
    pub emergency_backup_id: String,
    pub rollback_time: DateTime<Utc>,
    pub restored_files: Vec<String>,
    pub failed_files: Vec<String>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoRollbackRecord {
    pub auto_rollback_time: DateTime<Utc>,
    pub error_context: String,
    pub backup_used: String,
    pub success: bool,
}

/// Everything stored in the index file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    #[serde(default)]
    pub backups: BTreeMap<String, BackupRecord>,
    #[serde(default)]
    pub rollback_history: Vec<RollbackRecord>,
    #[serde(default)]
    pub auto_rollback_history: Vec<AutoRollbackRecord>,
}

impl BackupMetadata {
    /// Load the index. Only a missing file starts a fresh index; an
    /// unreadable or corrupt one is an error so it is never overwritten.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No backup index at {}, starting fresh", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).context(format!("Failed to read backup index {}", path.display()))
            }
        };

        serde_json::from_str(&content)
            .context(format!("Failed to parse backup index {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, json)
            .context(format!("Failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, path).context(format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    /// All backups, newest first
    pub fn sorted_backups(&self) -> Vec<&BackupRecord> {
        let mut backups: Vec<&BackupRecord> = self.backups.values().collect();
        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.backup_id.cmp(&a.backup_id))
        });
        backups
    }
}
