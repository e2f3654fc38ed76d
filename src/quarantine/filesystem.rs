//! Filesystem-based quarantine storage implementation.

use crate::core::error::{QuarantineError, QuarantineResult};
use crate::core::{FileHash, FileHasher, FileRef, ScanRecord};
use crate::quarantine::entry::{QuarantineEntry, QuarantineId};
use crate::quarantine::traits::QuarantineStore;

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Default name of the dedicated low-privilege account.
pub const DEFAULT_QUARANTINE_USER: &str = "AVsecure";

const QUARANTINE_DIR_NAME: &str = "quarantine";

#[cfg(windows)]
const CROSS_DEVICE_ERRNO: i32 = 17;
#[cfg(not(windows))]
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Picks the isolation directory.
///
/// An explicit directory wins. Otherwise `/home/<user>/quarantine` is used
/// when the dedicated account's home exists, and `<tmp>/quarantine` when it
/// does not.
pub fn resolve_location(user: &str, explicit: Option<&Path>) -> PathBuf {
    resolve_location_in(Path::new("/home"), &std::env::temp_dir(), user, explicit)
}

fn resolve_location_in(
    home_root: &Path,
    temp_root: &Path,
    user: &str,
    explicit: Option<&Path>,
) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }

    let home = home_root.join(user);
    if !user.is_empty() && home.is_dir() {
        home.join(QUARANTINE_DIR_NAME)
    } else {
        temp_root.join(QUARANTINE_DIR_NAME)
    }
}

/// Filesystem-based quarantine storage.
///
/// Files are moved, not copied, into a private directory under a name that
/// cannot be executed by accident. Each entry's metadata sits beside it as
/// JSON and is reloaded when the store is opened.
///
/// # Directory Structure
///
/// ```text
/// quarantine/
/// ├── data/
/// │   └── {id}.qdata          # Quarantined file
/// └── meta/
///     └── {id}.json           # QuarantineEntry
/// ```
#[derive(Debug)]
pub struct FilesystemQuarantine {
    /// Base directory for quarantine storage.
    base_path: PathBuf,
    /// Entries, newest first.
    index: RwLock<Vec<QuarantineEntry>>,
    hasher: FileHasher,
}

impl FilesystemQuarantine {
    /// Opens (creating if needed) a quarantine at the given path.
    pub fn new(base_path: impl Into<PathBuf>) -> QuarantineResult<Self> {
        let base_path = base_path.into();

        for dir in [base_path.join("data"), base_path.join("meta")] {
            std::fs::create_dir_all(&dir).map_err(|e| QuarantineError::SetupFailed {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        }
        restrict_permissions(&base_path);

        let store = Self {
            base_path,
            index: RwLock::new(Vec::new()),
            hasher: FileHasher::new(),
        };
        store.load_index()?;

        Ok(store)
    }

    /// Opens the quarantine for the dedicated `user`, see [`resolve_location`].
    pub fn for_user(user: &str, explicit: Option<&Path>) -> QuarantineResult<Self> {
        Self::new(resolve_location(user, explicit))
    }

    /// Returns the path to the quarantine data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.base_path.join("data")
    }

    /// Returns the path to the quarantine metadata directory.
    pub fn meta_dir(&self) -> PathBuf {
        self.base_path.join("meta")
    }

    fn data_path(&self, id: &QuarantineId) -> PathBuf {
        self.data_dir().join(format!("{}.qdata", id.as_str()))
    }

    fn meta_path(&self, id: &QuarantineId) -> PathBuf {
        self.meta_dir().join(format!("{}.json", id.as_str()))
    }

    /// Loads existing entries into the in-memory index.
    fn load_index(&self) -> QuarantineResult<()> {
        let meta_dir = self.meta_dir();
        let dir_entries = std::fs::read_dir(&meta_dir).map_err(|e| QuarantineError::SetupFailed {
            path: meta_dir.clone(),
            reason: e.to_string(),
        })?;

        let mut loaded = Vec::new();
        for dir_entry in dir_entries.filter_map(Result::ok) {
            let path = dir_entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_str::<QuarantineEntry>(&c).map_err(|e| e.to_string()))
            {
                Ok(entry) => loaded.push(entry),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable quarantine metadata")
                }
            }
        }
        loaded.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        tracing::debug!(count = loaded.len(), path = %self.base_path.display(), "Loaded quarantine index");
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        Ok(())
    }

    fn save_metadata(&self, entry: &QuarantineEntry) -> QuarantineResult<()> {
        let content = serde_json::to_string_pretty(entry)
            .map_err(|e| QuarantineError::move_failed(&entry.original_path, e.to_string()))?;
        std::fs::write(self.meta_path(&entry.id), content).map_err(|e| {
            QuarantineError::move_failed(
                &entry.original_path,
                format!("failed to write metadata: {}", e),
            )
        })
    }
}

#[async_trait]
impl QuarantineStore for FilesystemQuarantine {
    async fn quarantine(
        &self,
        file: &FileRef,
        record: &ScanRecord,
    ) -> QuarantineResult<QuarantineEntry> {
        let id = QuarantineId::new();
        let source = file.path().to_path_buf();
        let destination = self.data_path(&id);
        let hasher = self.hasher;

        let fingerprint_source = source.clone();
        let (file_hash, file_size) = tokio::task::spawn_blocking(move || {
            let hash = hasher.hash_file(&fingerprint_source)?;
            let size = std::fs::metadata(&fingerprint_source)?.len();
            Ok::<_, io::Error>((hash, size))
        })
        .await
        .map_err(|e| QuarantineError::move_failed(&source, e.to_string()))?
        .map_err(|e| QuarantineError::move_failed(&source, format!("cannot read file: {}", e)))?;

        let entry = QuarantineEntry::new(
            id,
            record,
            &source,
            &destination,
            file_hash.clone(),
            file_size,
        );
        self.save_metadata(&entry)?;

        let move_source = source.clone();
        let moved = tokio::task::spawn_blocking(move || {
            relocate(&move_source, &destination, &file_hash, hasher)
        })
        .await
        .map_err(|e| QuarantineError::move_failed(&source, e.to_string()))
        .and_then(|r| r);

        if let Err(e) = moved {
            let _ = std::fs::remove_file(self.meta_path(&entry.id));
            crate::audit::emit_quarantine_operation(&entry, false, Some(e.to_string().as_str()));
            return Err(e);
        }

        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(0, entry.clone());

        tracing::info!(
            quarantine_id = %entry.id,
            file = %entry.file_name,
            file_hash = %entry.file_hash,
            scan_id = %entry.triggering_scan_id,
            "File quarantined"
        );
        crate::audit::emit_quarantine_operation(&entry, true, None);

        Ok(entry)
    }

    async fn entries(&self) -> QuarantineResult<Vec<QuarantineEntry>> {
        Ok(self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn location(&self) -> &Path {
        &self.base_path
    }

    async fn count(&self) -> QuarantineResult<usize> {
        Ok(self.index.read().unwrap_or_else(PoisonError::into_inner).len())
    }
}

/// Moves `source` to `destination`.
///
/// A plain rename is used when both live on the same filesystem. Across
/// filesystems the content is copied, verified against `expected`, renamed
/// into place and only then is the original removed. On any failure the
/// original stays where it was and no partial copy is left behind.
fn relocate(
    source: &Path,
    destination: &Path,
    expected: &FileHash,
    hasher: FileHasher,
) -> QuarantineResult<()> {
    match std::fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => {
            tracing::debug!(
                source = %source.display(),
                "Quarantine crosses filesystems, falling back to copy"
            );
            copy_verify_replace(source, destination, expected, hasher)
        }
        Err(e) => Err(QuarantineError::move_failed(source, e.to_string())),
    }
}

fn copy_verify_replace(
    source: &Path,
    destination: &Path,
    expected: &FileHash,
    hasher: FileHasher,
) -> QuarantineResult<()> {
    let partial = destination.with_extension("partial");
    let discard = |path: &Path| {
        let _ = std::fs::remove_file(path);
    };

    if let Err(e) = std::fs::copy(source, &partial) {
        discard(&partial);
        return Err(QuarantineError::move_failed(source, format!("copy failed: {}", e)));
    }

    let actual = match hasher.hash_file(&partial) {
        Ok(hash) => hash,
        Err(e) => {
            discard(&partial);
            return Err(QuarantineError::move_failed(source, e.to_string()));
        }
    };
    if &actual != expected {
        discard(&partial);
        return Err(QuarantineError::IntegrityCheckFailed {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    if let Err(e) = std::fs::rename(&partial, destination) {
        discard(&partial);
        return Err(QuarantineError::move_failed(source, e.to_string()));
    }

    if let Err(e) = std::fs::remove_file(source) {
        discard(destination);
        return Err(QuarantineError::move_failed(
            source,
            format!("copied but could not remove original: {}", e),
        ));
    }

    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)) {
        tracing::warn!(path = %path.display(), error = %e, "Could not restrict quarantine permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
