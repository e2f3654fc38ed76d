//! Core types used throughout the scanwatch library.
//!
//! Per-engine verdicts and aggregate verdicts are deliberately separate
//! enums: a single engine can fail (`Error`), while a scan as a whole
//! degrades to `Indeterminate`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The verdict produced by one detection engine for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineVerdict {
    /// The engine found nothing.
    Clean,
    /// The engine detected a threat.
    Infected,
    /// The engine could not produce a verdict.
    Error,
}

impl EngineVerdict {
    /// Returns `true` if the engine reported the file clean.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Returns `true` if the engine detected a threat.
    pub fn is_infected(&self) -> bool {
        matches!(self, Self::Infected)
    }

    /// Returns `true` if the engine failed.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Returns the lowercase name of the verdict.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Infected => "infected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EngineVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verdict of a whole scan, reduced from every engine's result.
///
/// `Clean` means every engine confirmed the file clean. `Indeterminate`
/// means no engine detected a threat but at least one failed, so the file
/// is not confirmed clean. Callers must keep the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateVerdict {
    /// Confirmed clean by all engines.
    Clean,
    /// At least one engine detected a threat.
    Infected,
    /// No detection, but one or more engines failed.
    Indeterminate,
}

impl AggregateVerdict {
    /// Returns `true` for a confirmed clean verdict.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Returns `true` if any engine detected a threat.
    pub fn is_infected(&self) -> bool {
        matches!(self, Self::Infected)
    }

    /// Returns `true` if confidence was degraded by engine failures.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Indeterminate)
    }

    /// Returns the lowercase name of the verdict.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Infected => "infected",
            Self::Indeterminate => "indeterminate",
        }
    }
}

impl fmt::Display for AggregateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The action taken on a file after its verdict was known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAction {
    /// The file was left where it was.
    #[default]
    None,
    /// The file was moved into quarantine.
    Quarantined,
}

impl ScanAction {
    /// Returns the lowercase name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Quarantined => "quarantined",
        }
    }
}

impl fmt::Display for ScanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a scanned file came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSource {
    /// Uploaded content, staged into a temporary copy.
    #[default]
    Upload,
    /// A file created inside a watched folder.
    Watch,
    /// An existing file named explicitly by the caller.
    Path,
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Watch => write!(f, "watch"),
            Self::Path => write!(f, "path"),
        }
    }
}

/// Why an engine produced an `Error` verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// The process or remote service could not be reached or started.
    Unavailable,
    /// The engine did not finish in time (poll budget or deadline).
    Timeout,
    /// The engine answered with something that could not be interpreted.
    Parse,
    /// The scan was abandoned before the engine finished.
    Cancelled,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::Timeout => write!(f, "timeout"),
            Self::Parse => write!(f, "parse"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// BLAKE3 digest of a scanned file, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHash(pub String);

impl FileHash {
    /// Wraps an already computed hex digest.
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blake3:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_predicates() {
        assert!(EngineVerdict::Clean.is_clean());
        assert!(EngineVerdict::Infected.is_infected());
        assert!(EngineVerdict::Error.is_error());

        assert!(AggregateVerdict::Indeterminate.is_indeterminate());
        assert!(!AggregateVerdict::Indeterminate.is_clean());
    }

    #[test]
    fn test_verdict_serde_names() {
        let json = serde_json::to_string(&AggregateVerdict::Indeterminate).unwrap();
        assert_eq!(json, "\"indeterminate\"");

        let action: ScanAction = serde_json::from_str("\"quarantined\"").unwrap();
        assert_eq!(action, ScanAction::Quarantined);
    }

    #[test]
    fn test_file_hash_display() {
        let hash = FileHash::new("abc123");
        assert_eq!(format!("{}", hash), "blake3:abc123");
    }
}
