//! Error types for the scanwatch library.
//!
//! Engine failures are never propagated as control flow past the engine
//! boundary: an [`EngineError`] is folded into an `EngineResult` with an
//! `Error` verdict. The remaining error types surface to callers.

use crate::core::types::EngineErrorKind;

use std::path::PathBuf;
use thiserror::Error;

/// Why a detection engine could not produce a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine process or service could not be started or reached.
    #[error("engine '{engine}' is unavailable: {reason}")]
    Unavailable {
        /// Name of the engine.
        engine: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The engine did not reach a terminal state in time.
    #[error("engine '{engine}' timed out: {reason}")]
    Timeout {
        /// Name of the engine.
        engine: String,
        /// What ran out (poll budget, process timeout, deadline).
        reason: String,
    },

    /// The engine answered with a malformed or incomplete response.
    #[error("malformed response from engine '{engine}': {details}")]
    Parse {
        /// Name of the engine.
        engine: String,
        /// What was missing or malformed.
        details: String,
    },

    /// The scan was abandoned while the engine was still running.
    #[error("engine '{engine}' was cancelled")]
    Cancelled {
        /// Name of the engine.
        engine: String,
    },
}

impl EngineError {
    /// Creates an `Unavailable` error.
    pub fn unavailable(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Timeout {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Parse` error.
    pub fn parse(engine: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Parse {
            engine: engine.into(),
            details: details.into(),
        }
    }

    /// Creates a `Cancelled` error.
    pub fn cancelled(engine: impl Into<String>) -> Self {
        Self::Cancelled {
            engine: engine.into(),
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> EngineErrorKind {
        match self {
            Self::Unavailable { .. } => EngineErrorKind::Unavailable,
            Self::Timeout { .. } => EngineErrorKind::Timeout,
            Self::Parse { .. } => EngineErrorKind::Parse,
            Self::Cancelled { .. } => EngineErrorKind::Cancelled,
        }
    }

    /// Returns the engine this error belongs to.
    pub fn engine(&self) -> &str {
        match self {
            Self::Unavailable { engine, .. }
            | Self::Timeout { engine, .. }
            | Self::Parse { engine, .. }
            | Self::Cancelled { engine } => engine,
        }
    }
}

/// Errors raised by the scan entry points themselves (not by engines).
#[derive(Debug, Error)]
pub enum ScanError {
    /// The file to scan does not exist.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was not found.
        path: PathBuf,
    },

    /// Staging or inspecting the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No engine is configured.
    #[error("at least one detection engine is required")]
    NoEngines,

    /// Configuration error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl ScanError {
    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Error type for quarantine operations.
#[derive(Debug, Error)]
pub enum QuarantineError {
    /// The file could not be moved into quarantine. The original is untouched.
    #[error("failed to move '{path}' into quarantine: {reason}")]
    MoveFailed {
        /// The file that should have been moved.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// The quarantine directory could not be prepared.
    #[error("failed to prepare quarantine directory '{path}': {reason}")]
    SetupFailed {
        /// The quarantine directory.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// A cross-filesystem copy did not match the original content.
    #[error("file integrity check failed: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        /// Expected hash.
        expected: String,
        /// Actual hash.
        actual: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuarantineError {
    /// Creates a `MoveFailed` error.
    pub fn move_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MoveFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Error type for watch-session transitions.
#[derive(Debug, Error)]
pub enum WatchError {
    /// A session for this folder is already running.
    #[error("folder '{folder}' is already being watched")]
    AlreadyRunning {
        /// The folder.
        folder: PathBuf,
    },

    /// No session is running for this folder.
    #[error("folder '{folder}' is not being watched")]
    NotRunning {
        /// The folder.
        folder: PathBuf,
    },

    /// The OS watch handle could not be acquired.
    #[error("failed to watch folder '{folder}': {reason}")]
    SetupFailed {
        /// The folder.
        folder: PathBuf,
        /// Reason for the failure.
        reason: String,
    },
}

impl WatchError {
    /// Returns the folder the error refers to.
    pub fn folder(&self) -> &std::path::Path {
        match self {
            Self::AlreadyRunning { folder }
            | Self::NotRunning { folder }
            | Self::SetupFailed { folder, .. } => folder,
        }
    }
}

/// Error type for history persistence.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Reading or writing the durable record failed.
    #[error("history file '{path}': {source}")]
    Io {
        /// The history file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The durable record could not be encoded or decoded.
    #[error("history serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Error type for alert delivery.
#[derive(Debug, Error)]
pub enum AlertError {
    /// The alert could not be sent.
    #[error("alert delivery failed: {reason}")]
    Delivery {
        /// Reason for the failure.
        reason: String,
    },

    /// The sink answered with a non-success status.
    #[error("alert rejected with status {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        /// The file.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config file '{path}': {source}")]
    ParseToml {
        /// The file.
        path: String,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A remote engine is enabled without credentials.
    #[error("engine '{engine}' is enabled but has no api_key")]
    MissingApiKey {
        /// The engine.
        engine: String,
    },
}

/// A specialized `Result` type for quarantine operations.
pub type QuarantineResult<T> = Result<T, QuarantineError>;

/// A specialized `Result` type for watch-session operations.
pub type WatchResult<T> = Result<T, WatchError>;
