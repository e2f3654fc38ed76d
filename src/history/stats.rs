//! Derived scan statistics.

use crate::core::ScanRecord;

use serde::{Deserialize, Serialize};

/// Counters derived from the scan history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of scan records.
    pub files_scanned: u64,
    /// Number of records with an Infected verdict.
    pub threats_detected: u64,
    /// Number of folders with a running watch session.
    pub watched_folders: u64,
    /// `100 - threats * 100 / files` in integer arithmetic, 0 before the
    /// first scan.
    pub protection_rate: u64,
}

impl Stats {
    /// Recomputes every counter from the full record set.
    pub fn from_records(records: &[ScanRecord], watched_folders: u64) -> Self {
        let files_scanned = records.len() as u64;
        let threats_detected = records.iter().filter(|r| r.is_infected()).count() as u64;
        Self::new(files_scanned, threats_detected, watched_folders)
    }

    /// Builds stats from raw counters.
    pub fn new(files_scanned: u64, threats_detected: u64, watched_folders: u64) -> Self {
        Self {
            files_scanned,
            threats_detected,
            watched_folders,
            protection_rate: protection_rate(files_scanned, threats_detected),
        }
    }

    /// Returns the stats after one more record.
    pub fn with_record(self, record: &ScanRecord) -> Self {
        Self::new(
            self.files_scanned + 1,
            self.threats_detected + u64::from(record.is_infected()),
            self.watched_folders,
        )
    }

    /// Returns the stats with a new watched-folder count.
    pub fn with_watched_folders(self, watched_folders: u64) -> Self {
        Self {
            watched_folders,
            ..self
        }
    }
}

/// The share of scanned files that were not threats, as a whole percentage.
pub fn protection_rate(files_scanned: u64, threats_detected: u64) -> u64 {
    if files_scanned == 0 {
        return 0;
    }
    100u64.saturating_sub(threats_detected.saturating_mul(100) / files_scanned)
}
