//! File references handed to detection engines.
//!
//! A [`FileRef`] is the single shape every scan request takes before it
//! reaches the dispatcher, whether the bytes came from an upload or from a
//! file created in a watched folder. Uploaded bytes are staged into a
//! temporary copy that is deleted when the last holder drops the reference.

use crate::core::error::ScanError;
use crate::core::types::ScanSource;

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

const FALLBACK_NAME: &str = "upload";
/// Longest extension carried onto a staged copy's file name.
const MAX_STAGED_EXTENSION: usize = 16;

/// An on-disk file plus the name it was declared under.
///
/// # Examples
///
/// ```rust,no_run
/// use scanwatch::core::FileRef;
///
/// // Uploaded content is staged to a temporary file.
/// let upload = FileRef::from_upload("report.pdf", b"%PDF-1.7").unwrap();
/// assert!(upload.is_temporary());
///
/// // Existing files are scanned in place.
/// let existing = FileRef::from_path("/srv/inbox/invoice.docx").unwrap();
/// assert_eq!(existing.name(), "invoice.docx");
/// ```
#[derive(Debug)]
pub struct FileRef {
    name: String,
    path: PathBuf,
    source: ScanSource,
    /// Deletes the staged copy on drop. `None` for files scanned in place.
    staged: Option<TempPath>,
}

impl FileRef {
    /// Stages uploaded bytes into the system temporary directory.
    pub fn from_upload(name: &str, data: &[u8]) -> Result<Self, ScanError> {
        Self::from_upload_in(std::env::temp_dir(), name, data)
    }

    /// Stages uploaded bytes into `dir`.
    ///
    /// Only the final component of `name` is kept, so a declared name like
    /// `../../etc/passwd` cannot escape the staging directory. The staged
    /// copy carries just the extension; the full name stays in [`name`].
    ///
    /// [`name`]: FileRef::name
    pub fn from_upload_in(
        dir: impl AsRef<Path>,
        name: &str,
        data: &[u8],
    ) -> Result<Self, ScanError> {
        let name = sanitize_name(name);
        let mut staged = tempfile::Builder::new()
            .prefix("scanwatch-")
            .suffix(&staged_suffix(&name))
            .tempfile_in(dir)?;
        staged.write_all(data)?;
        staged.flush()?;

        let staged = staged.into_temp_path();
        Ok(Self {
            name,
            path: staged.to_path_buf(),
            source: ScanSource::Upload,
            staged: Some(staged),
        })
    }

    /// References an existing file named by the caller.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ScanError> {
        Self::existing(path.into(), ScanSource::Path)
    }

    /// References a file reported by a watch session.
    pub fn from_watch_event(path: impl Into<PathBuf>) -> Result<Self, ScanError> {
        Self::existing(path.into(), ScanSource::Watch)
    }

    fn existing(path: PathBuf, source: ScanSource) -> Result<Self, ScanError> {
        if !path.is_file() {
            return Err(ScanError::FileNotFound { path });
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_NAME.to_string());

        Ok(Self {
            name,
            path,
            source,
            staged: None,
        })
    }

    /// Returns the declared file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the path engines should read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns where the file came from.
    pub fn source(&self) -> ScanSource {
        self.source
    }

    /// Returns `true` if this reference owns a staged temporary copy.
    pub fn is_temporary(&self) -> bool {
        self.staged.is_some()
    }

    /// Returns the current size of the file in bytes.
    pub fn size(&self) -> std::io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Reads the whole file.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

fn sanitize_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

fn staged_suffix(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= MAX_STAGED_EXTENSION)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_upload_is_staged_and_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let file = FileRef::from_upload_in(dir.path(), "report.pdf", b"content").unwrap();

        assert!(file.is_temporary());
        assert_eq!(file.name(), "report.pdf");
        assert_eq!(file.source(), ScanSource::Upload);
        assert_eq!(std::fs::read(file.path()).unwrap(), b"content");

        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_upload_name_cannot_escape() {
        let dir = TempDir::new().unwrap();
        let file = FileRef::from_upload_in(dir.path(), "../../etc/passwd", b"x").unwrap();

        assert_eq!(file.name(), "passwd");
        assert!(file.path().starts_with(dir.path()));
    }

    #[test]
    fn test_long_upload_name_is_staged() {
        let dir = TempDir::new().unwrap();
        let declared = format!("{}.pdf", "r".repeat(240));
        let file = FileRef::from_upload_in(dir.path(), &declared, b"%PDF").unwrap();

        assert_eq!(file.name(), declared);
        let staged = file.path().file_name().unwrap().to_str().unwrap();
        assert!(staged.len() < 64, "staged name too long: {}", staged);
        assert!(staged.ends_with(".pdf"));
        assert_eq!(std::fs::read(file.path()).unwrap(), b"%PDF");
    }

    #[test]
    fn test_staged_suffix() {
        assert_eq!(staged_suffix("report.pdf"), ".pdf");
        assert_eq!(staged_suffix("archive.tar.gz"), ".gz");
        assert_eq!(staged_suffix("README"), "");
        assert_eq!(staged_suffix(&format!("x.{}", "e".repeat(40))), "");
        assert_eq!(staged_suffix("odd.p d f"), "");
    }

    #[test]
    fn test_existing_file_is_not_deleted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invoice.docx");
        std::fs::write(&path, b"data").unwrap();

        let file = FileRef::from_watch_event(&path).unwrap();
        assert!(!file.is_temporary());
        assert_eq!(file.name(), "invoice.docx");
        assert_eq!(file.size().unwrap(), 4);

        drop(file);
        assert!(path.exists());
    }

    #[test]
    fn test_missing_file() {
        let result = FileRef::from_path("/definitely/not/here.bin");
        assert!(matches!(result, Err(ScanError::FileNotFound { .. })));
    }
}
