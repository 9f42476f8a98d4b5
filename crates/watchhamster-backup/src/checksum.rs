//! SHA-256 file checksums

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;
use watchhamster_common::{Result, ResultExt};

/// Hex-encoded SHA-256 of a file's contents.
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path).context(format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).context(format!("Failed to read {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Hex-encoded SHA-256 of a byte slice.
pub fn bytes_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_and_bytes_checksum_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hook.py");
        std::fs::write(&path, b"send_webhook()").unwrap();

        let from_file = file_checksum(&path).unwrap();
        assert_eq!(from_file, bytes_checksum(b"send_webhook()"));
        assert_eq!(from_file.len(), 64);
        assert_eq!(
            bytes_checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(file_checksum(&dir.path().join("absent")).is_err());
    }
}
