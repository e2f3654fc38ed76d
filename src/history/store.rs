//! Append-only scan history with optional JSON persistence.

use crate::core::error::HistoryError;
use crate::core::ScanRecord;
use crate::history::stats::Stats;

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// On-disk shape of the history file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    stats: Stats,
    recent_scans: Vec<ScanRecord>,
}

#[derive(Debug, Default)]
struct HistoryState {
    /// Newest first.
    records: Vec<ScanRecord>,
    stats: Stats,
    /// Bumped on every mutation so writes of older states can be dropped.
    version: u64,
}

impl HistoryState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            stats: self.stats,
            recent_scans: self.records.clone(),
        }
    }
}

/// Ordered store of scan records plus the stats derived from them.
///
/// Records are only ever inserted at the head. The insert and the stats
/// update happen under one write lock, so readers never see a record
/// without its effect on the stats or the other way round. When a path is
/// set, each mutation yields a [`PendingWrite`] holding a copy of the new
/// state. The file is rewritten atomically outside the lock, and a write
/// whose state is older than the last one on disk is skipped. A write
/// failure is logged and does not undo the mutation.
#[derive(Debug, Default)]
pub struct HistoryStore {
    state: RwLock<HistoryState>,
    path: Option<PathBuf>,
    /// Version of the state last written to `path`.
    written: Arc<Mutex<Option<u64>>>,
}

/// A copy of the history taken under the lock, waiting to be written.
///
/// [`write`](PendingWrite::write) does blocking file I/O. Async callers
/// should run it through `tokio::task::spawn_blocking`.
#[derive(Debug)]
#[must_use = "the history file is only updated when the write runs"]
pub struct PendingWrite {
    path: PathBuf,
    version: u64,
    snapshot: Snapshot,
    written: Arc<Mutex<Option<u64>>>,
}

impl PendingWrite {
    /// Returns the state version this write carries.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Writes the snapshot unless a newer one already reached disk.
    ///
    /// Returns `false` when the write was skipped as stale.
    pub fn write(self) -> Result<bool, HistoryError> {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*written, Some(last) if last >= self.version) {
            tracing::trace!(version = self.version, "Skipping stale history write");
            return Ok(false);
        }

        let bytes = serde_json::to_vec_pretty(&self.snapshot)?;
        write_atomic(&self.path, &bytes).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })?;
        *written = Some(self.version);
        Ok(true)
    }

    /// Writes the snapshot, logging a failure instead of returning it.
    pub fn write_logged(self) {
        let path = self.path.clone();
        if let Err(e) = self.write() {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist scan history");
        }
    }
}

impl HistoryStore {
    /// Creates a store that is not persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a store backed by `path`, loading it if the file exists.
    ///
    /// Stats are recomputed from the loaded records; the watched-folder
    /// count starts at zero because no session survives a restart.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        let snapshot = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(source) => return Err(HistoryError::Io { path, source }),
        };

        let records = snapshot.recent_scans;
        let stats = Stats::from_records(&records, 0);
        if stats.files_scanned != snapshot.stats.files_scanned
            || stats.threats_detected != snapshot.stats.threats_detected
        {
            tracing::warn!(
                path = %path.display(),
                "Stored stats disagree with stored records, recomputing"
            );
        }
        tracing::debug!(
            path = %path.display(),
            records = records.len(),
            "Loaded scan history"
        );

        Ok(Self {
            state: RwLock::new(HistoryState {
                records,
                stats,
                version: 0,
            }),
            path: Some(path),
            written: Arc::default(),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HistoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HistoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self, state: &HistoryState) -> Option<PendingWrite> {
        let path = self.path.as_ref()?;
        Some(PendingWrite {
            path: path.clone(),
            version: state.version,
            snapshot: state.snapshot(),
            written: Arc::clone(&self.written),
        })
    }

    /// Inserts `record` at the head without touching the backing file.
    ///
    /// Returns the updated stats plus the write that persists them, if the
    /// store has a path.
    pub fn insert(&self, record: ScanRecord) -> (Stats, Option<PendingWrite>) {
        let mut state = self.write();
        state.stats = state.stats.with_record(&record);
        state.records.insert(0, record);
        state.version += 1;
        (state.stats, self.pending(&state))
    }

    /// Inserts `record` at the head, persists, and returns the updated stats.
    ///
    /// The file write happens on the calling thread after the lock is
    /// released. Async code should use [`insert`](Self::insert) instead.
    pub fn record(&self, record: ScanRecord) -> Stats {
        let (stats, pending) = self.insert(record);
        if let Some(pending) = pending {
            pending.write_logged();
        }
        stats
    }

    /// Sets the watched-folder count and returns the updated stats.
    pub fn set_watched_folders(&self, watched_folders: u64) -> Stats {
        let (stats, pending) = {
            let mut state = self.write();
            if state.stats.watched_folders == watched_folders {
                return state.stats;
            }
            state.stats = state.stats.with_watched_folders(watched_folders);
            state.version += 1;
            (state.stats, self.pending(&state))
        };
        if let Some(pending) = pending {
            pending.write_logged();
        }
        stats
    }

    /// Returns the current stats.
    pub fn stats(&self) -> Stats {
        self.read().stats
    }

    /// Returns all records, newest first.
    pub fn records(&self) -> Vec<ScanRecord> {
        self.read().records.clone()
    }

    /// Returns up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ScanRecord> {
        self.read().records.iter().take(limit).cloned().collect()
    }

    /// Looks up a record by id.
    pub fn get(&self, id: &str) -> Option<ScanRecord> {
        self.read().records.iter().find(|r| r.id == id).cloned()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// Returns the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the current state to the backing file.
    pub fn save(&self) -> Result<(), HistoryError> {
        let pending = self.pending(&self.read());
        match pending {
            Some(pending) => pending.write().map(|_| ()),
            None => Ok(()),
        }
    }
}

/// Replaces `path` with `bytes` via a sibling temporary file.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineResult;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(id: &str, infected: bool) -> ScanRecord {
        let result = if infected {
            EngineResult::infected("clamscan", "Eicar", Duration::from_millis(1))
        } else {
            EngineResult::clean("clamscan", "OK", Duration::from_millis(1))
        };
        ScanRecord::new(id, format!("{}.bin", id), vec![result])
    }

    #[test]
    fn test_head_insertion() {
        let store = HistoryStore::in_memory();
        store.record(record("r1", false));
        store.record(record("r2", false));

        let ids: Vec<_> = store.records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert_eq!(store.recent(1)[0].id, "r2");
    }

    #[test]
    fn test_empty_store_stats() {
        let store = HistoryStore::in_memory();
        assert_eq!(store.stats(), Stats::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_stats_follow_records() {
        let store = HistoryStore::in_memory();
        store.set_watched_folders(1);
        store.record(record("a", false));
        store.record(record("b", true));
        store.record(record("c", false));
        let stats = store.record(record("d", false));

        assert_eq!(stats.files_scanned, 4);
        assert_eq!(stats.threats_detected, 1);
        assert_eq!(stats.watched_folders, 1);
        assert_eq!(stats.protection_rate, 75);
    }

    #[test]
    fn test_concurrent_records_are_all_counted() {
        let store = Arc::new(HistoryStore::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.record(record(&format!("{}-{}", t, i), i % 5 == 0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = store.stats();
        assert_eq!(stats.files_scanned, 200);
        assert_eq!(stats.threats_detected, 40);
        assert_eq!(store.len(), 200);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        {
            let store = HistoryStore::open(&path).unwrap();
            store.set_watched_folders(3);
            store.record(record("old", true));
            store.record(record("new", false));
        }

        let reloaded = HistoryStore::open(&path).unwrap();
        let ids: Vec<_> = reloaded.records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(reloaded.stats(), Stats::new(2, 1, 0));
        assert_eq!(reloaded.get("old").unwrap().file_name, "old.bin");
    }

    #[test]
    fn test_insert_defers_the_file_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let store = HistoryStore::open(&path).unwrap();

        let (stats, pending) = store.insert(record("a", true));
        let pending = pending.unwrap();

        // The new state is visible before anything reaches disk.
        assert_eq!(store.stats(), stats);
        assert_eq!(store.len(), 1);
        assert!(!path.exists());

        assert!(pending.write().unwrap());
        assert_eq!(HistoryStore::open(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_stale_write_does_not_overwrite_newer_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let store = HistoryStore::open(&path).unwrap();

        let (_, older) = store.insert(record("first", false));
        let (_, newer) = store.insert(record("second", false));
        let (older, newer) = (older.unwrap(), newer.unwrap());
        assert!(older.version() < newer.version());

        assert!(newer.write().unwrap());
        assert!(!older.write().unwrap());

        let ids: Vec<_> = HistoryStore::open(&path)
            .unwrap()
            .records()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[test]
    fn test_in_memory_store_has_nothing_to_write() {
        let store = HistoryStore::in_memory();
        let (stats, pending) = store.insert(record("a", false));
        assert!(pending.is_none());
        assert_eq!(stats.files_scanned, 1);
        assert!(store.save().is_ok());
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::open(dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.stats().protection_rate, 0);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(matches!(
            HistoryStore::open(&path),
            Err(HistoryError::Serialize(_))
        ));
    }
}
