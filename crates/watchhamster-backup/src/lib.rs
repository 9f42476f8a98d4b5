//! # WatchHamster Backup
//!
//! Backup and rollback of the files that drive webhook delivery.
//!
//! Every backup copies the tracked files into its own directory under the
//! backup root and records a SHA-256 checksum per file. A rollback first takes
//! an emergency backup of the current files, then restores the chosen backup
//! and checks that every restored file hashes to the recorded checksum.

pub mod checksum;
pub mod manager;
pub mod metadata;

pub use checksum::{bytes_checksum, file_checksum};
pub use manager::{BackupConfig, BackupManager, BackupSystemStatus, EMERGENCY_BACKUP_NAME};
pub use metadata::{
    AutoRollbackRecord, BackupMetadata, BackupRecord, BackupStatus, RollbackRecord,
    METADATA_FILE,
};
