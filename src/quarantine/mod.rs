//! Quarantine storage for infected files.
//!
//! This module provides a trait-based abstraction for quarantine storage,
//! allowing infected files to be moved out of reach and tracked.

mod entry;
mod filesystem;
mod traits;

pub use entry::{QuarantineEntry, QuarantineId};
pub use filesystem::{resolve_location, FilesystemQuarantine, DEFAULT_QUARANTINE_USER};
pub use traits::QuarantineStore;
