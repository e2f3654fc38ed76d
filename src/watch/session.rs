//! Watch session state.

use chrono::{DateTime, Utc};
use notify::RecommendedWatcher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    /// No OS watch handle is held.
    Stopped,
    /// Create events in the folder trigger scans.
    Running,
}

impl WatchState {
    /// Returns the state as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one folder's watch session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSession {
    /// The watched folder, canonicalized.
    pub folder_path: PathBuf,
    /// Current state.
    pub state: WatchState,
    /// When the session entered `Running`.
    pub started_at: DateTime<Utc>,
}

impl WatchSession {
    pub(crate) fn running(folder_path: PathBuf) -> Self {
        Self {
            folder_path,
            state: WatchState::Running,
            started_at: Utc::now(),
        }
    }

    pub(crate) fn stopped(mut self) -> Self {
        self.state = WatchState::Stopped;
        self
    }

    /// Returns `true` while the session holds a watch handle.
    pub fn is_running(&self) -> bool {
        self.state == WatchState::Running
    }
}

/// A running session and the resources it owns.
///
/// Dropping it releases the OS watch handle and stops the event loop, so
/// every path that removes a session from the registry releases it.
pub(crate) struct ActiveWatch {
    pub(crate) session: WatchSession,
    /// The folder as the caller named it, made absolute. Still matches
    /// after the folder is deleted and can no longer be canonicalized.
    pub(crate) requested: PathBuf,
    pub(crate) _watcher: RecommendedWatcher,
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<()>,
}

impl fmt::Debug for ActiveWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveWatch")
            .field("session", &self.session)
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl Drop for ActiveWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
