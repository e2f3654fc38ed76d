//! Scan result structures.
//!
//! [`EngineResult`] is one engine's answer for one file; [`ScanRecord`] is
//! the immutable, aggregated outcome of one dispatch that the history store
//! keeps.

use crate::core::error::EngineError;
use crate::core::types::{
    AggregateVerdict, EngineErrorKind, EngineVerdict, FileHash, ScanAction, ScanSource,
};
use crate::dispatch::aggregate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One engine's result for one file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResult {
    /// Name of the engine that produced this result.
    pub engine_id: String,

    /// The engine's verdict.
    pub verdict: EngineVerdict,

    /// Threat name, engine summary, or failure cause.
    pub detail: String,

    /// Failure classification when `verdict` is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<EngineErrorKind>,

    /// How long the engine took.
    #[serde(rename = "latency_ms", with = "duration_serde")]
    pub latency: Duration,
}

impl EngineResult {
    /// Creates a `Clean` result.
    pub fn clean(engine_id: impl Into<String>, detail: impl Into<String>, latency: Duration) -> Self {
        Self {
            engine_id: engine_id.into(),
            verdict: EngineVerdict::Clean,
            detail: detail.into(),
            error_kind: None,
            latency,
        }
    }

    /// Creates an `Infected` result.
    pub fn infected(
        engine_id: impl Into<String>,
        detail: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            engine_id: engine_id.into(),
            verdict: EngineVerdict::Infected,
            detail: detail.into(),
            error_kind: None,
            latency,
        }
    }

    /// Folds an engine failure into an `Error` result.
    pub fn failed(engine_id: impl Into<String>, error: &EngineError, latency: Duration) -> Self {
        Self {
            engine_id: engine_id.into(),
            verdict: EngineVerdict::Error,
            detail: error.to_string(),
            error_kind: Some(error.kind()),
            latency,
        }
    }

    /// Returns `true` if the engine failed.
    pub fn is_error(&self) -> bool {
        self.verdict.is_error()
    }

    /// Returns `true` if the engine detected a threat.
    pub fn is_infected(&self) -> bool {
        self.verdict.is_infected()
    }
}

/// The outcome of one completed dispatch.
///
/// The aggregate verdict is computed from `per_engine` at construction and
/// the record is never edited after it enters the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Unique identifier for this record.
    pub id: String,

    /// Declared name of the scanned file.
    pub file_name: String,

    /// Where the file was read from when it was scanned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Where the file came from.
    #[serde(default)]
    pub source: ScanSource,

    /// BLAKE3 digest of the content, if it could be computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<FileHash>,

    /// Size of the content in bytes, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    /// When the dispatch completed.
    pub timestamp: DateTime<Utc>,

    /// Per-engine results, in the order engines were configured.
    pub per_engine: Vec<EngineResult>,

    /// The verdict reduced from `per_engine`.
    pub aggregate_verdict: AggregateVerdict,

    /// What was done with the file.
    pub action: ScanAction,
}

impl ScanRecord {
    /// Creates a record for `file_name` from a complete set of engine results.
    pub fn new(
        id: impl Into<String>,
        file_name: impl Into<String>,
        per_engine: Vec<EngineResult>,
    ) -> Self {
        let aggregate_verdict = aggregate(&per_engine);
        Self {
            id: id.into(),
            file_name: file_name.into(),
            file_path: None,
            source: ScanSource::default(),
            file_hash: None,
            file_size: None,
            timestamp: Utc::now(),
            per_engine,
            aggregate_verdict,
            action: ScanAction::None,
        }
    }

    /// Generates a fresh record identifier.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Sets the path the file was read from.
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Sets the source.
    pub fn with_source(mut self, source: ScanSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the content hash.
    pub fn with_file_hash(mut self, hash: FileHash) -> Self {
        self.file_hash = Some(hash);
        self
    }

    /// Sets the content size.
    pub fn with_file_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    /// Sets the action taken.
    pub fn with_action(mut self, action: ScanAction) -> Self {
        self.action = action;
        self
    }

    /// Returns `true` if any engine detected a threat.
    pub fn is_infected(&self) -> bool {
        self.aggregate_verdict.is_infected()
    }

    /// Returns the results of engines that failed.
    pub fn failed_engines(&self) -> Vec<&EngineResult> {
        self.per_engine.iter().filter(|r| r.is_error()).collect()
    }

    /// Returns the names of engines that detected a threat.
    pub fn detecting_engines(&self) -> Vec<&str> {
        self.per_engine
            .iter()
            .filter(|r| r.is_infected())
            .map(|r| r.engine_id.as_str())
            .collect()
    }

    /// Returns the number of engines that took part.
    pub fn engine_count(&self) -> usize {
        self.per_engine.len()
    }
}

/// Serde helper for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
