//! Folder-to-session registry.

use crate::core::error::{WatchError, WatchResult};
use crate::watch::session::{ActiveWatch, WatchSession};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long a new file's size must hold still before it is handed off.
const SETTLE_INTERVAL: Duration = Duration::from_millis(250);
/// Upper bound on waiting for a writer to finish.
const SETTLE_LIMIT: Duration = Duration::from_secs(5);

/// Called with the path of every regular file created in a watched folder,
/// once its size has stopped changing.
///
/// Runs on a runtime worker and must not block; hand the path off
/// to a spawned task.
pub type FileHandler = Arc<dyn Fn(PathBuf) + Send + Sync>;

/// Tracks at most one running session per folder.
///
/// Folders are keyed by their canonical path, so `./drop` and
/// `/srv/app/drop` are the same folder. A folder that was deleted after
/// its session started can still be stopped by the name it was started
/// with.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    sessions: Mutex<HashMap<PathBuf, ActiveWatch>>,
}

impl WatchRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, ActiveWatch>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves `folder` from Stopped to Running.
    ///
    /// Fails with `AlreadyRunning` when a session exists (the running session
    /// is left untouched and no new handle is acquired) and with
    /// `SetupFailed` when the folder is not a directory or the OS refuses
    /// the watch. Must be called from within a Tokio runtime.
    pub fn start(&self, folder: impl AsRef<Path>, on_create: FileHandler) -> WatchResult<WatchSession> {
        let requested = folder.as_ref();
        let setup_failed = |reason: String| WatchError::SetupFailed {
            folder: requested.to_path_buf(),
            reason,
        };

        if !requested.is_dir() {
            return Err(setup_failed("not an existing directory".to_string()));
        }
        let key = requested
            .canonicalize()
            .map_err(|e| setup_failed(e.to_string()))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| setup_failed(e.to_string()))?;

        let mut sessions = self.lock();
        if sessions.contains_key(&key) {
            return Err(WatchError::AlreadyRunning { folder: key });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| setup_failed(e.to_string()))?;
        watcher
            .watch(&key, RecursiveMode::NonRecursive)
            .map_err(|e| setup_failed(e.to_string()))?;

        let cancel = CancellationToken::new();
        let task = runtime.spawn(run_event_loop(key.clone(), rx, cancel.clone(), on_create));
        let session = WatchSession::running(key.clone());

        sessions.insert(
            key,
            ActiveWatch {
                session: session.clone(),
                requested: absolute(requested),
                _watcher: watcher,
                cancel,
                task,
            },
        );
        drop(sessions);

        tracing::info!(folder = %session.folder_path.display(), "Watch session started");
        crate::audit::emit_watch_session(&session);
        Ok(session)
    }

    /// Moves `folder` from Running to Stopped and releases its handle.
    pub fn stop(&self, folder: impl AsRef<Path>) -> WatchResult<WatchSession> {
        let requested = folder.as_ref();
        let mut sessions = self.lock();
        let active = find_key(&sessions, requested)
            .and_then(|key| sessions.remove(&key))
            .ok_or_else(|| WatchError::NotRunning {
                folder: requested
                    .canonicalize()
                    .unwrap_or_else(|_| absolute(requested)),
            })?;
        drop(sessions);
        let session = active.session.clone().stopped();
        drop(active);

        tracing::info!(folder = %session.folder_path.display(), "Watch session stopped");
        crate::audit::emit_watch_session(&session);
        Ok(session)
    }

    /// Returns snapshots of all running sessions, oldest first.
    pub fn sessions(&self) -> Vec<WatchSession> {
        let mut sessions: Vec<_> = self.lock().values().map(|a| a.session.clone()).collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    /// Returns `true` if `folder` has a running session.
    pub fn is_running(&self, folder: impl AsRef<Path>) -> bool {
        find_key(&self.lock(), folder.as_ref()).is_some()
    }

    /// Returns the number of running sessions.
    pub fn running_count(&self) -> usize {
        self.lock().len()
    }

    /// Stops every session. Returns the stopped snapshots.
    pub fn shutdown(&self) -> Vec<WatchSession> {
        let drained: Vec<ActiveWatch> = self.lock().drain().map(|(_, a)| a).collect();
        drained
            .into_iter()
            .map(|active| {
                let session = active.session.clone().stopped();
                drop(active);
                crate::audit::emit_watch_session(&session);
                session
            })
            .collect()
    }
}

/// Resolves `requested` to the key of its running session.
///
/// Tries the canonical path first, then the absolute path against both the
/// keys and the names sessions were started under.
fn find_key(sessions: &HashMap<PathBuf, ActiveWatch>, requested: &Path) -> Option<PathBuf> {
    if let Ok(key) = requested.canonicalize() {
        if sessions.contains_key(&key) {
            return Some(key);
        }
    }
    let requested = absolute(requested);
    if sessions.contains_key(&requested) {
        return Some(requested);
    }
    sessions
        .iter()
        .find(|(_, active)| active.requested == requested)
        .map(|(key, _)| key.clone())
}

/// Makes `path` absolute against the working directory without touching
/// the filesystem. `.` components are dropped; `..` is kept as written.
fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    joined.components().collect()
}

/// Waits until the file at `path` has a non-zero size that holds for one
/// `interval`, or until `limit` passes.
///
/// Create events arrive as soon as the file exists, usually before the
/// writer is done. Returns `false` if the file disappears while waiting.
async fn wait_until_settled(path: &Path, interval: Duration, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    let mut last = None;
    loop {
        let len = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return false,
        };
        if len > 0 && last == Some(len) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::debug!(file = %path.display(), size = len, "File still changing, scanning anyway");
            return true;
        }
        last = Some(len);
        tokio::time::sleep(interval).await;
    }
}

async fn run_event_loop(
    folder: PathBuf,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    cancel: CancellationToken,
    on_create: FileHandler,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(Ok(event)) => {
                    if !matches!(event.kind, EventKind::Create(_)) {
                        continue;
                    }
                    for path in event.paths {
                        if path.is_file() {
                            tracing::debug!(folder = %folder.display(), file = %path.display(), "New file detected");
                            let cancel = cancel.clone();
                            let on_create = Arc::clone(&on_create);
                            tokio::spawn(async move {
                                let settled = tokio::select! {
                                    _ = cancel.cancelled() => return,
                                    settled = wait_until_settled(&path, SETTLE_INTERVAL, SETTLE_LIMIT) => settled,
                                };
                                if settled {
                                    on_create(path);
                                } else {
                                    tracing::debug!(file = %path.display(), "File vanished before it settled");
                                }
                            });
                        } else {
                            tracing::trace!(file = %path.display(), "Ignoring non-file create event");
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(folder = %folder.display(), error = %e, "Watch error");
                }
                None => break,
            }
        }
    }
    tracing::debug!(folder = %folder.display(), "Watch event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::WatchState;
    use tempfile::TempDir;

    fn channel_handler() -> (FileHandler, mpsc::UnboundedReceiver<PathBuf>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: FileHandler = Arc::new(move |path| {
            let _ = tx.send(path);
        });
        (handler, rx)
    }

    fn noop_handler() -> FileHandler {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = WatchRegistry::new();

        let first = registry.start(dir.path(), noop_handler()).unwrap();
        let err = registry.start(dir.path(), noop_handler()).unwrap_err();

        assert!(matches!(err, WatchError::AlreadyRunning { .. }));
        assert_eq!(registry.running_count(), 1);
        assert_eq!(registry.sessions(), vec![first]);
    }

    #[tokio::test]
    async fn test_stop_unknown_folder() {
        let dir = TempDir::new().unwrap();
        let registry = WatchRegistry::new();

        let err = registry.stop(dir.path()).unwrap_err();
        assert!(matches!(err, WatchError::NotRunning { .. }));
    }

    #[tokio::test]
    async fn test_start_stop_start() {
        let dir = TempDir::new().unwrap();
        let registry = WatchRegistry::new();

        registry.start(dir.path(), noop_handler()).unwrap();
        let stopped = registry.stop(dir.path()).unwrap();
        assert_eq!(stopped.state, WatchState::Stopped);
        assert!(!registry.is_running(dir.path()));

        assert!(registry.start(dir.path(), noop_handler()).is_ok());
    }

    #[tokio::test]
    async fn test_missing_folder_fails_setup() {
        let dir = TempDir::new().unwrap();
        let registry = WatchRegistry::new();

        let err = registry
            .start(dir.path().join("missing"), noop_handler())
            .unwrap_err();
        assert!(matches!(err, WatchError::SetupFailed { .. }));

        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(registry.start(&file, noop_handler()).is_err());
        assert_eq!(registry.running_count(), 0);
    }

    #[tokio::test]
    async fn test_created_files_reach_handler() {
        let dir = TempDir::new().unwrap();
        let registry = WatchRegistry::new();
        let (handler, mut rx) = channel_handler();
        registry.start(dir.path(), handler).unwrap();

        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::fs::write(dir.path().join("invoice.pdf"), b"%PDF").unwrap();

        let path = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no create event within 5s")
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "invoice.pdf");
    }

    #[tokio::test]
    async fn test_stop_after_folder_is_deleted() {
        let dir = TempDir::new().unwrap();
        let drop_dir = dir.path().join("drop");
        std::fs::create_dir(&drop_dir).unwrap();
        let registry = WatchRegistry::new();
        registry.start(&drop_dir, noop_handler()).unwrap();

        std::fs::remove_dir(&drop_dir).unwrap();
        assert!(registry.is_running(&drop_dir));

        let stopped = registry.stop(&drop_dir).unwrap();
        assert_eq!(stopped.state, WatchState::Stopped);
        assert_eq!(registry.running_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_through_dangling_symlink() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        std::fs::create_dir(&target).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let registry = WatchRegistry::new();

        let session = registry.start(&link, noop_handler()).unwrap();
        assert_eq!(session.folder_path, target.canonicalize().unwrap());

        std::fs::remove_dir(&target).unwrap();
        assert!(registry.stop(&link).is_ok());
        assert_eq!(registry.running_count(), 0);
    }

    #[test]
    fn test_absolute_drops_current_dir_components() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("./drop")), cwd.join("drop"));
        assert_eq!(absolute(Path::new("/srv/./drop")), PathBuf::from("/srv/drop"));
    }

    #[tokio::test]
    async fn test_settle_waits_for_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"").unwrap();

        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .unwrap();
            for _ in 0..5 {
                file.write_all(&[0u8; 1024]).unwrap();
                std::thread::sleep(Duration::from_millis(10));
            }
        });

        let settled =
            wait_until_settled(&path, Duration::from_millis(150), Duration::from_secs(5)).await;
        writer.join().unwrap();

        assert!(settled);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 5 * 1024);
    }

    #[tokio::test]
    async fn test_settle_gives_up_on_vanished_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.bin");
        assert!(!wait_until_settled(&path, Duration::from_millis(10), Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_settle_limit_bounds_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let started = std::time::Instant::now();
        let settled =
            wait_until_settled(&path, Duration::from_millis(20), Duration::from_millis(200)).await;
        assert!(settled);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let registry = WatchRegistry::new();
        registry.start(a.path(), noop_handler()).unwrap();
        registry.start(b.path(), noop_handler()).unwrap();

        let stopped = registry.shutdown();
        assert_eq!(stopped.len(), 2);
        assert!(stopped.iter().all(|s| !s.is_running()));
        assert_eq!(registry.running_count(), 0);
    }
}
