//! Core traits for the scanwatch library.
//!
//! This module defines the `Engine` trait that every detection adapter
//! implements.

use crate::core::error::EngineError;
use crate::core::input::FileRef;
use crate::core::result::EngineResult;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::time::Instant;

/// What an engine concluded about a file when it managed to conclude anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Nothing found.
    Clean {
        /// Engine summary, e.g. `"0/72 engines"`.
        detail: String,
    },
    /// A threat was found.
    Infected {
        /// Threat name or engine summary.
        detail: String,
    },
}

impl Detection {
    /// Creates a `Clean` detection.
    pub fn clean(detail: impl Into<String>) -> Self {
        Self::Clean {
            detail: detail.into(),
        }
    }

    /// Creates an `Infected` detection.
    pub fn infected(detail: impl Into<String>) -> Self {
        Self::Infected {
            detail: detail.into(),
        }
    }
}

/// A pluggable detection backend.
///
/// Implementors provide [`detect`](Engine::detect); callers use
/// [`scan`](Engine::scan), which times the call and turns every
/// [`EngineError`] into an `Error` result. The dispatcher therefore never
/// needs engine-specific error handling.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scanwatch::core::{Detection, Engine, EngineError, FileRef};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct SizeLimit(u64);
///
/// #[async_trait]
/// impl Engine for SizeLimit {
///     fn name(&self) -> &str {
///         "size-limit"
///     }
///
///     async fn detect(&self, file: &FileRef) -> Result<Detection, EngineError> {
///         let size = file
///             .size()
///             .map_err(|e| EngineError::unavailable(self.name(), e.to_string()))?;
///         if size > self.0 {
///             Ok(Detection::infected("oversized payload"))
///         } else {
///             Ok(Detection::clean("within limit"))
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Engine: Send + Sync + Debug {
    /// Returns the stable identifier of this engine, e.g. `"clamscan"`.
    fn name(&self) -> &str;

    /// Inspects the file.
    ///
    /// Implementations must not panic; every failure is an `EngineError`.
    async fn detect(&self, file: &FileRef) -> Result<Detection, EngineError>;

    /// Inspects the file and packages the outcome as an [`EngineResult`].
    async fn scan(&self, file: &FileRef) -> EngineResult {
        let started = Instant::now();
        let outcome = self.detect(file).await;
        let latency = started.elapsed();

        match outcome {
            Ok(Detection::Clean { detail }) => EngineResult::clean(self.name(), detail, latency),
            Ok(Detection::Infected { detail }) => {
                EngineResult::infected(self.name(), detail, latency)
            }
            Err(error) => {
                tracing::warn!(
                    engine = self.name(),
                    file = %file.name(),
                    kind = %error.kind(),
                    error = %error,
                    "Engine failed"
                );
                EngineResult::failed(self.name(), &error, latency)
            }
        }
    }
}

/// An arc-wrapped engine for shared ownership across scan tasks.
pub type ArcEngine = Arc<dyn Engine>;
