//! Mock engine for testing.
//!
//! This module provides a configurable engine that can be used in tests to
//! simulate clean, infected, slow or failing engines without a real backend.

use crate::core::{Detection, Engine, EngineError, FileRef};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A mock engine for testing purposes.
///
/// # Examples
///
/// ```rust
/// use scanwatch::engines::MockEngine;
/// use scanwatch::core::EngineError;
/// use std::time::Duration;
///
/// // Reports every file as clean
/// let engine = MockEngine::clean("mock-a");
///
/// // Reports every file as infected after 50ms
/// let engine = MockEngine::infected("mock-b", "Eicar-Test-Signature")
///     .with_latency(Duration::from_millis(50));
///
/// // Fails with a timeout
/// let engine = MockEngine::failing("mock-c", EngineError::timeout("mock-c", "poll budget exhausted"));
/// ```
#[derive(Debug)]
pub struct MockEngine {
    name: String,
    outcome: Result<Detection, EngineError>,
    latency: Option<Duration>,
    scan_count: AtomicU64,
}

impl MockEngine {
    /// Creates a mock engine that always reports clean.
    pub fn clean(name: impl Into<String>) -> Self {
        Self::with_outcome(name, Ok(Detection::clean("OK")))
    }

    /// Creates a mock engine that always reports `threat`.
    pub fn infected(name: impl Into<String>, threat: impl Into<String>) -> Self {
        Self::with_outcome(name, Ok(Detection::infected(threat)))
    }

    /// Creates a mock engine that always fails with `error`.
    pub fn failing(name: impl Into<String>, error: EngineError) -> Self {
        Self::with_outcome(name, Err(error))
    }

    fn with_outcome(name: impl Into<String>, outcome: Result<Detection, EngineError>) -> Self {
        Self {
            name: name.into(),
            outcome,
            latency: None,
            scan_count: AtomicU64::new(0),
        }
    }

    /// Sets the simulated latency for scans.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the number of scans started.
    pub fn scan_count(&self) -> u64 {
        self.scan_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(&self, file: &FileRef) -> Result<Detection, EngineError> {
        self.scan_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        tracing::debug!(engine = %self.name, file = %file.name(), "Mock scan finished");
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EngineErrorKind, EngineVerdict};
    use tempfile::TempDir;

    fn sample(dir: &TempDir) -> FileRef {
        FileRef::from_upload_in(dir.path(), "sample.bin", b"test data").unwrap()
    }

    #[tokio::test]
    async fn test_mock_engine_clean() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::clean("mock");

        let result = engine.scan(&sample(&dir)).await;
        assert_eq!(result.verdict, EngineVerdict::Clean);
        assert_eq!(result.engine_id, "mock");
        assert_eq!(engine.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_engine_infected() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::infected("mock", "Test.Malware");

        let result = engine.scan(&sample(&dir)).await;
        assert!(result.is_infected());
        assert_eq!(result.detail, "Test.Malware");
    }

    #[tokio::test]
    async fn test_mock_engine_failure_is_data() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::failing("mock", EngineError::unavailable("mock", "down"));

        let result = engine.scan(&sample(&dir)).await;
        assert!(result.is_error());
        assert_eq!(result.error_kind, Some(EngineErrorKind::Unavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_engine_latency() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::clean("slow").with_latency(Duration::from_secs(3));

        let result = engine.scan(&sample(&dir)).await;
        assert!(result.latency >= Duration::from_secs(3));
    }
}
