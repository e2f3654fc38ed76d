//! Quarantine store trait definition.

use crate::core::error::QuarantineResult;
use crate::core::{FileRef, ScanRecord};
use crate::quarantine::entry::QuarantineEntry;

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;

/// Trait for quarantine storage implementations.
///
/// A store takes ownership of infected files: after a successful
/// [`quarantine`](QuarantineStore::quarantine) the file no longer exists at
/// its original path. On failure the original is left where it was.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scanwatch::quarantine::{QuarantineEntry, QuarantineStore};
/// use scanwatch::core::{FileRef, ScanRecord};
/// use scanwatch::core::error::QuarantineResult;
/// use async_trait::async_trait;
/// use std::path::Path;
///
/// #[derive(Debug)]
/// struct ObjectStoreQuarantine {
///     // Your storage implementation
/// }
///
/// #[async_trait]
/// impl QuarantineStore for ObjectStoreQuarantine {
///     async fn quarantine(
///         &self,
///         file: &FileRef,
///         record: &ScanRecord,
///     ) -> QuarantineResult<QuarantineEntry> {
///         todo!()
///     }
///
///     async fn entries(&self) -> QuarantineResult<Vec<QuarantineEntry>> {
///         todo!()
///     }
///
///     fn location(&self) -> &Path {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait QuarantineStore: Send + Sync + Debug {
    /// Moves the file into isolation and records the entry.
    ///
    /// # Arguments
    ///
    /// * `file` - The infected file
    /// * `record` - The scan that found it
    async fn quarantine(
        &self,
        file: &FileRef,
        record: &ScanRecord,
    ) -> QuarantineResult<QuarantineEntry>;

    /// Lists entries, newest first.
    async fn entries(&self) -> QuarantineResult<Vec<QuarantineEntry>>;

    /// Returns the isolation directory.
    fn location(&self) -> &Path;

    /// Returns the number of quarantined files.
    async fn count(&self) -> QuarantineResult<usize> {
        Ok(self.entries().await?.len())
    }
}
