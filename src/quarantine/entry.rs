//! Quarantine entry types.

use crate::core::{FileHash, ScanRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a quarantined file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuarantineId(pub String);

impl QuarantineId {
    /// Creates a new random quarantine ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for QuarantineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QuarantineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file that was moved into quarantine.
///
/// Created only for Infected scans and never deleted by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    /// Unique identifier for this entry.
    pub id: QuarantineId,

    /// Declared name of the file.
    pub file_name: String,

    /// Where the file was before it was moved.
    pub original_path: PathBuf,

    /// Where the file lives now.
    pub quarantine_path: PathBuf,

    /// When the file was quarantined.
    pub timestamp: DateTime<Utc>,

    /// Id of the scan record that triggered the move.
    pub triggering_scan_id: String,

    /// BLAKE3 digest of the content.
    pub file_hash: FileHash,

    /// Size of the file in bytes.
    pub file_size: u64,
}

impl QuarantineEntry {
    /// Creates an entry for a file about to be moved to `quarantine_path`.
    pub fn new(
        id: QuarantineId,
        record: &ScanRecord,
        original_path: impl Into<PathBuf>,
        quarantine_path: impl Into<PathBuf>,
        file_hash: FileHash,
        file_size: u64,
    ) -> Self {
        Self {
            id,
            file_name: record.file_name.clone(),
            original_path: original_path.into(),
            quarantine_path: quarantine_path.into(),
            timestamp: Utc::now(),
            triggering_scan_id: record.id.clone(),
            file_hash,
            file_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineResult;
    use std::time::Duration;

    #[test]
    fn test_quarantine_id() {
        let id1 = QuarantineId::new();
        let id2 = QuarantineId::new();
        assert_ne!(id1, id2);
        assert_eq!(serde_json::to_value(&id1).unwrap(), id1.as_str());
    }

    #[test]
    fn test_entry_links_scan_record() {
        let record = ScanRecord::new(
            "scan-42",
            "dropper.exe",
            vec![EngineResult::infected("clamscan", "Win.Trojan", Duration::from_millis(8))],
        );
        let entry = QuarantineEntry::new(
            QuarantineId::new(),
            &record,
            "/srv/inbox/dropper.exe",
            "/home/AVsecure/quarantine/data/x.qdata",
            FileHash::new("ab"),
            2,
        );

        assert_eq!(entry.triggering_scan_id, "scan-42");
        assert_eq!(entry.file_name, "dropper.exe");
    }
}
