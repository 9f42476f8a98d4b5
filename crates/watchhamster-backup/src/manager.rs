//! Backup manager

use crate::checksum::file_checksum;
use crate::metadata::{
    AutoRollbackRecord, BackupMetadata, BackupRecord, BackupStatus, RollbackRecord, METADATA_FILE,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use watchhamster_common::{Error, Result, ResultExt};

/// Name given to the backup taken right before a rollback
pub const EMERGENCY_BACKUP_NAME: &str = "emergency_before_rollback";

/// Backup manager configuration
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Directory holding backup directories and the index
    pub root: PathBuf,
    /// Directory tracked paths are relative to
    pub base_dir: PathBuf,
    /// Files to back up, relative to `base_dir`
    pub tracked_files: Vec<String>,
    pub max_backups: usize,
    pub auto_rollback_enabled: bool,
}

impl BackupConfig {
    pub fn new(root: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base_dir: base_dir.into(),
            tracked_files: Vec::new(),
            max_backups: 10,
            auto_rollback_enabled: true,
        }
    }

    pub fn with_tracked_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked_files = files.into_iter().map(Into::into).collect();
        self
    }
}

/// Summary returned by [`BackupManager::status`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupSystemStatus {
    pub total_backups: usize,
    pub successful_backups: usize,
    pub failed_backups: usize,
    pub total_size: u64,
    pub auto_rollback_enabled: bool,
    pub max_backups: usize,
    pub backup_root: PathBuf,
    pub most_recent_backup: Option<String>,
    pub rollback_count: usize,
    pub auto_rollback_count: usize,
    pub last_rollback: Option<DateTime<Utc>>,
    pub last_auto_rollback: Option<DateTime<Utc>>,
}

/// Creates, verifies and restores backups of the tracked webhook files
pub struct BackupManager {
    config: BackupConfig,
    metadata: BackupMetadata,
}

impl BackupManager {
    /// Open the backup root, creating it if needed, and load the index.
    pub fn open(config: BackupConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.root)
            .context(format!("Failed to create backup root {}", config.root.display()))?;

        let metadata = BackupMetadata::load(&config.root.join(METADATA_FILE))?;
        info!(
            "Backup manager opened at {} ({} backups)",
            config.root.display(),
            metadata.backups.len()
        );
        Ok(Self { config, metadata })
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn get_backup(&self, backup_id: &str) -> Option<&BackupRecord> {
        self.metadata.backups.get(backup_id)
    }

    fn save_metadata(&self) -> Result<()> {
        self.metadata.save(&self.config.root.join(METADATA_FILE))
    }

    fn next_backup_id(&self, backup_name: &str) -> String {
        let base = format!(
            "webhook_backup_{}_{}",
            backup_name,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let mut candidate = base.clone();
        let mut n = 1;
        while self.metadata.backups.contains_key(&candidate)
            || self.config.root.join(&candidate).exists()
        {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        candidate
    }

    /// Copy every existing tracked file into a new backup directory.
    pub fn create_backup(&mut self, backup_name: &str, description: &str) -> Result<String> {
        let backup_id = self.next_backup_id(backup_name);
        let backup_path = self.config.root.join(&backup_id);
        info!("Creating backup {}", backup_id);

        match self.copy_tracked_files(&backup_path) {
            Ok((files, checksums, total_size)) => {
                let record = BackupRecord {
                    backup_id: backup_id.clone(),
                    backup_name: backup_name.to_string(),
                    description: description.to_string(),
                    created_at: Utc::now(),
                    backup_path,
                    file_count: files.len(),
                    backed_up_files: files,
                    file_checksums: checksums,
                    total_size,
                    status: BackupStatus::Completed,
                    error: None,
                };
                info!(
                    "Backup {} completed ({} files, {:.1} KB)",
                    backup_id,
                    record.file_count,
                    total_size as f64 / 1024.0
                );
                self.metadata.backups.insert(backup_id.clone(), record);
                self.save_metadata()?;
                self.cleanup_old_backups()?;
                Ok(backup_id)
            }
            Err(e) => {
                error!("Backup {} failed: {}", backup_id, e);
                if backup_path.exists() {
                    if let Err(rm) = std::fs::remove_dir_all(&backup_path) {
                        warn!("Failed to remove partial backup {}: {}", backup_id, rm);
                    }
                }
                self.metadata.backups.insert(
                    backup_id.clone(),
                    BackupRecord {
                        backup_id: backup_id.clone(),
                        backup_name: backup_name.to_string(),
                        description: description.to_string(),
                        created_at: Utc::now(),
                        backup_path,
                        backed_up_files: Vec::new(),
                        file_checksums: HashMap::new(),
                        file_count: 0,
                        total_size: 0,
                        status: BackupStatus::Failed,
                        error: Some(e.to_string()),
                    },
                );
                self.save_metadata()?;
                Err(e)
            }
        }
    }

    fn copy_tracked_files(
        &self,
        backup_path: &Path,
    ) -> Result<(Vec<String>, HashMap<String, String>, u64)> {
        std::fs::create_dir_all(backup_path)?;

        let mut files = Vec::new();
        let mut checksums = HashMap::new();
        let mut total_size = 0u64;

        for relative in &self.config.tracked_files {
            let source = self.config.base_dir.join(relative);
            if !source.is_file() {
                warn!("Tracked file missing, skipped: {}", relative);
                continue;
            }

            let dest = backup_path.join(relative);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            total_size +=
                std::fs::copy(&source, &dest).context(format!("Failed to copy {}", relative))?;
            checksums.insert(relative.clone(), file_checksum(&dest)?);
            files.push(relative.clone());
            debug!("Backed up {}", relative);
        }

        Ok((files, checksums, total_size))
    }

    /// Restore every file of `backup_id`, after taking an emergency backup of
    /// the current files. Restored files must hash to the recorded checksums.
    pub fn rollback_to_backup(&mut self, backup_id: &str) -> Result<RollbackRecord> {
        let record = self
            .metadata
            .backups
            .get(backup_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("backup {}", backup_id)))?;

        if !record.is_completed() {
            return Err(Error::validation(format!(
                "backup {} is not a completed backup",
                backup_id
            )));
        }
        if !record.backup_path.is_dir() {
            return Err(Error::not_found(format!(
                "backup directory {}",
                record.backup_path.display()
            )));
        }

        info!("Rolling back to {}", backup_id);
        let emergency_backup_id = self.create_backup(
            EMERGENCY_BACKUP_NAME,
            &format!("Emergency backup before rollback to {}", backup_id),
        )?;

        let mut restored_files = Vec::new();
        let mut failed_files = Vec::new();
        let mut mismatch = None;

        for relative in &record.backed_up_files {
            let source = record.backup_path.join(relative);
            let dest = self.config.base_dir.join(relative);

            match restore_file(&source, &dest) {
                Ok(()) => {}
                Err(e) => {
                    error!("Failed to restore {}: {}", relative, e);
                    failed_files.push(relative.clone());
                    continue;
                }
            }

            if let Some(expected) = record.file_checksums.get(relative) {
                let actual = file_checksum(&dest)?;
                if &actual != expected {
                    error!("Checksum mismatch after restoring {}", relative);
                    failed_files.push(relative.clone());
                    mismatch.get_or_insert_with(|| {
                        Error::checksum_mismatch(dest.display().to_string(), expected, actual)
                    });
                    continue;
                }
            }
            restored_files.push(relative.clone());
        }

        let rollback = RollbackRecord {
            rollback_id: format!("rollback_{}_{}", backup_id, Utc::now().timestamp()),
            source_backup_id: backup_id.to_string(),
            emergency_backup_id,
            rollback_time: Utc::now(),
            success: failed_files.is_empty(),
            restored_files,
            failed_files,
        };
        self.metadata.rollback_history.push(rollback.clone());
        self.save_metadata()?;

        if let Some(e) = mismatch {
            return Err(e);
        }
        if !rollback.success {
            return Err(Error::Internal(format!(
                "rollback to {} failed for {} files: {}",
                backup_id,
                rollback.failed_files.len(),
                rollback.failed_files.join(", ")
            )));
        }

        info!(
            "Rollback to {} completed ({} files restored)",
            backup_id,
            rollback.restored_files.len()
        );
        Ok(rollback)
    }

    /// Roll back to the most recent regular backup. Returns the backup used,
    /// or `None` when auto-rollback is off or no backup exists.
    pub fn auto_rollback_on_error(&mut self, error_context: &str) -> Result<Option<String>> {
        if !self.config.auto_rollback_enabled {
            info!("Auto-rollback disabled, ignoring error: {}", error_context);
            return Ok(None);
        }

        warn!("Auto-rollback triggered: {}", error_context);
        let Some(backup_id) = self.most_recent_backup() else {
            error!("No backup available for auto-rollback");
            return Ok(None);
        };

        self.rollback_to_backup(&backup_id)?;

        self.metadata.auto_rollback_history.push(AutoRollbackRecord {
            auto_rollback_time: Utc::now(),
            error_context: error_context.to_string(),
            backup_used: backup_id.clone(),
            success: true,
        });
        self.save_metadata()?;
        Ok(Some(backup_id))
    }

    /// Newest completed non-emergency backup
    pub fn most_recent_backup(&self) -> Option<String> {
        self.metadata
            .sorted_backups()
            .into_iter()
            .find(|b| b.is_completed() && !b.is_emergency())
            .map(|b| b.backup_id.clone())
    }

    /// All backups, newest first
    pub fn list_backups(&self) -> Vec<BackupRecord> {
        self.metadata
            .sorted_backups()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Check every file in the backup exists and matches its checksum.
    pub fn verify_backup_integrity(&self, backup_id: &str) -> Result<()> {
        let record = self
            .metadata
            .backups
            .get(backup_id)
            .ok_or_else(|| Error::not_found(format!("backup {}", backup_id)))?;

        if !record.backup_path.is_dir() {
            return Err(Error::not_found(format!(
                "backup directory {}",
                record.backup_path.display()
            )));
        }

        for relative in &record.backed_up_files {
            let path = record.backup_path.join(relative);
            if !path.is_file() {
                return Err(Error::not_found(format!("backup file {}", path.display())));
            }
            if let Some(expected) = record.file_checksums.get(relative) {
                let actual = file_checksum(&path)?;
                if &actual != expected {
                    return Err(Error::checksum_mismatch(
                        path.display().to_string(),
                        expected,
                        actual,
                    ));
                }
            }
        }

        info!("Backup {} verified ({} files)", backup_id, record.file_count);
        Ok(())
    }

    /// Delete the oldest regular backups beyond `max_backups`.
    fn cleanup_old_backups(&mut self) -> Result<()> {
        let stale: Vec<(String, PathBuf)> = self
            .metadata
            .sorted_backups()
            .into_iter()
            .filter(|b| !b.is_emergency())
            .skip(self.config.max_backups)
            .map(|b| (b.backup_id.clone(), b.backup_path.clone()))
            .collect();

        if stale.is_empty() {
            return Ok(());
        }

        for (backup_id, path) in &stale {
            if path.exists() {
                if let Err(e) = std::fs::remove_dir_all(path) {
                    warn!("Failed to delete old backup {}: {}", backup_id, e);
                    continue;
                }
            }
            self.metadata.backups.remove(backup_id);
            info!("Deleted old backup {}", backup_id);
        }

        self.save_metadata()
    }

    pub fn status(&self) -> BackupSystemStatus {
        let backups = self.metadata.sorted_backups();
        BackupSystemStatus {
            total_backups: backups.len(),
            successful_backups: backups.iter().filter(|b| b.is_completed()).count(),
            failed_backups: backups.iter().filter(|b| !b.is_completed()).count(),
            total_size: backups.iter().map(|b| b.total_size).sum(),
            auto_rollback_enabled: self.config.auto_rollback_enabled,
            max_backups: self.config.max_backups,
            backup_root: self.config.root.clone(),
            most_recent_backup: self.most_recent_backup(),
            rollback_count: self.metadata.rollback_history.len(),
            auto_rollback_count: self.metadata.auto_rollback_history.len(),
            last_rollback: self.metadata.rollback_history.last().map(|r| r.rollback_time),
            last_auto_rollback: self
                .metadata
                .auto_rollback_history
                .last()
                .map(|r| r.auto_rollback_time),
        }
    }
}

fn restore_file(source: &Path, dest: &Path) -> Result<()> {
    if !source.is_file() {
        return Err(Error::not_found(format!("backup file {}", source.display())));
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(source, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::bytes_checksum;

    const FILES: &[&str] = &["core/monitor.py", "webhook_config.json"];

    fn setup(max_backups: usize) -> (tempfile::TempDir, BackupManager) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("core")).unwrap();
        std::fs::write(dir.path().join("core/monitor.py"), b"def send(): pass\n").unwrap();
        std::fs::write(dir.path().join("webhook_config.json"), br#"{"url": "a"}"#).unwrap();

        let mut config = BackupConfig::new(dir.path().join("webhook_backup"), dir.path())
            .with_tracked_files(FILES.iter().copied().chain(["missing.py"]));
        config.max_backups = max_backups;
        let manager = BackupManager::open(config).unwrap();
        (dir, manager)
    }

    #[test]
    fn test_create_backup_records_checksums() {
        let (dir, mut manager) = setup(10);
        let id = manager.create_backup("before_change", "test").unwrap();
        assert!(id.starts_with("webhook_backup_before_change_"));

        let record = manager.get_backup(&id).unwrap();
        assert_eq!(record.file_count, 2);
        assert_eq!(record.status, BackupStatus::Completed);
        assert_eq!(
            record.file_checksums["core/monitor.py"],
            bytes_checksum(b"def send(): pass\n")
        );
        assert!(record.backup_path.join("core/monitor.py").is_file());
        assert!(dir.path().join("webhook_backup").join(METADATA_FILE).is_file());

        manager.verify_backup_integrity(&id).unwrap();
    }

    #[test]
    fn test_rollback_restores_identical_bytes() {
        let (dir, mut manager) = setup(10);
        let original = std::fs::read(dir.path().join("webhook_config.json")).unwrap();
        let id = manager.create_backup("stable", "").unwrap();

        std::fs::write(dir.path().join("webhook_config.json"), br#"{"url": "broken"}"#).unwrap();
        std::fs::remove_file(dir.path().join("core/monitor.py")).unwrap();

        let rollback = manager.rollback_to_backup(&id).unwrap();
        assert!(rollback.success);
        assert_eq!(rollback.restored_files.len(), 2);
        assert_eq!(
            std::fs::read(dir.path().join("webhook_config.json")).unwrap(),
            original
        );
        assert!(dir.path().join("core/monitor.py").is_file());

        // Emergency backup captured the broken state
        let emergency = manager.get_backup(&rollback.emergency_backup_id).unwrap();
        assert!(emergency.is_emergency());
        assert_eq!(emergency.file_count, 1);
        assert_eq!(manager.status().rollback_count, 1);
    }

    #[test]
    fn test_tampered_backup_is_detected() {
        let (_dir, mut manager) = setup(10);
        let id = manager.create_backup("stable", "").unwrap();
        let path = manager.get_backup(&id).unwrap().backup_path.join("webhook_config.json");
        std::fs::write(&path, b"tampered").unwrap();

        assert!(matches!(
            manager.verify_backup_integrity(&id),
            Err(Error::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            manager.rollback_to_backup(&id),
            Err(Error::ChecksumMismatch { .. })
        ));
        let history = &manager.metadata.rollback_history;
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
    }

    #[test]
    fn test_partial_rollback_is_error() {
        let (_dir, mut manager) = setup(10);
        let id = manager.create_backup("stable", "").unwrap();
        let path = manager.get_backup(&id).unwrap().backup_path.join("core/monitor.py");
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            manager.rollback_to_backup(&id),
            Err(Error::Internal(_))
        ));
        let last = manager.metadata.rollback_history.last().unwrap();
        assert!(!last.success);
        assert_eq!(last.failed_files, vec!["core/monitor.py".to_string()]);
        assert_eq!(last.restored_files, vec!["webhook_config.json".to_string()]);
    }

    #[test]
    fn test_checksums_describe_backup_copies() {
        let (_dir, mut manager) = setup(10);
        let id = manager.create_backup("stable", "").unwrap();
        let record = manager.get_backup(&id).unwrap();

        for relative in FILES {
            let copy = record.backup_path.join(relative);
            assert_eq!(record.file_checksums[*relative], file_checksum(&copy).unwrap());
        }
    }

    #[test]
    fn test_corrupt_index_is_not_overwritten() {
        let (dir, mut manager) = setup(10);
        manager.create_backup("stable", "").unwrap();

        let index = dir.path().join("webhook_backup").join(METADATA_FILE);
        let mut content = std::fs::read(&index).unwrap();
        content.push(b'}');
        std::fs::write(&index, &content).unwrap();

        let err = BackupManager::open(manager.config().clone()).err().unwrap();
        assert!(err.to_string().contains("Failed to parse backup index"));
        assert_eq!(std::fs::read(&index).unwrap(), content);
    }

    #[test]
    fn test_missing_index_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = BackupMetadata::load(&dir.path().join(METADATA_FILE)).unwrap();
        assert!(metadata.backups.is_empty());
        assert!(metadata.rollback_history.is_empty());
    }

    #[test]
    fn test_prune_keeps_newest_regular_backups() {
        let (_dir, mut manager) = setup(2);
        let first = manager.create_backup("one", "").unwrap();
        let second = manager.create_backup("two", "").unwrap();
        let rollback = manager.rollback_to_backup(&second).unwrap();
        let third = manager.create_backup("three", "").unwrap();

        let ids: Vec<String> = manager.list_backups().into_iter().map(|b| b.backup_id).collect();
        assert!(!ids.contains(&first));
        assert!(ids.contains(&second));
        assert!(ids.contains(&rollback.emergency_backup_id));
        assert_eq!(ids[0], third);
        assert_eq!(manager.most_recent_backup(), Some(third));
    }

    #[test]
    fn test_auto_rollback() {
        let (dir, mut manager) = setup(10);
        assert_eq!(manager.auto_rollback_on_error("nothing yet").unwrap(), None);

        let id = manager.create_backup("stable", "").unwrap();
        std::fs::write(dir.path().join("webhook_config.json"), b"garbage").unwrap();

        let used = manager.auto_rollback_on_error("webhook send failed").unwrap();
        assert_eq!(used, Some(id));
        let status = manager.status();
        assert_eq!(status.auto_rollback_count, 1);
        assert!(status.last_auto_rollback.is_some());

        manager.config.auto_rollback_enabled = false;
        assert_eq!(manager.auto_rollback_on_error("ignored").unwrap(), None);
    }

    #[test]
    fn test_unknown_backup_and_reopen() {
        let (dir, mut manager) = setup(10);
        assert!(matches!(
            manager.rollback_to_backup("nope"),
            Err(Error::NotFound { .. })
        ));
        let id = manager.create_backup("persisted", "kept across runs").unwrap();

        let reopened = BackupManager::open(manager.config().clone()).unwrap();
        assert_eq!(reopened.get_backup(&id).unwrap().description, "kept across runs");
        assert_eq!(reopened.status().successful_backups, 1);
        drop(dir);
    }
}
