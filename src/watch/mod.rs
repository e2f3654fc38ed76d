//! Folder watch sessions.
//!
//! A [`WatchRegistry`] owns one session per watched folder. Each running
//! session holds an OS watch handle and a background event loop that turns
//! file-create events into calls to a [`FileHandler`].

mod registry;
mod session;

pub use registry::{FileHandler, WatchRegistry};
pub use session::{WatchSession, WatchState};
