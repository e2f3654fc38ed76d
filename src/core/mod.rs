//! Core types and traits for the scanwatch library.
//!
//! - [`types`] - Verdicts, actions, sources, `FileHash`
//! - [`traits`] - The `Engine` trait
//! - [`error`] - Structured error types
//! - [`input`] - The `FileRef` handed to engines
//! - [`hasher`] - BLAKE3 file hashing
//! - [`result`] - `EngineResult` and `ScanRecord`

pub mod error;
pub mod hasher;
pub mod input;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{
    AlertError, ConfigError, EngineError, HistoryError, QuarantineError, ScanError, WatchError,
};
pub use hasher::FileHasher;
pub use input::FileRef;
pub use result::{EngineResult, ScanRecord};
pub use traits::{ArcEngine, Detection, Engine};
pub use types::{
    AggregateVerdict, EngineErrorKind, EngineVerdict, FileHash, ScanAction, ScanSource,
};
