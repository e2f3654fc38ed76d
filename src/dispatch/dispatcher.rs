//! Concurrent fan-out of one file to every configured engine.

use crate::core::{ArcEngine, EngineError, EngineResult, FileRef, ScanError};

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Global deadline for one dispatch, across all engines.
    pub deadline: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(180),
        }
    }
}

impl DispatcherConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Runs every engine against a file concurrently and collects one result per
/// engine.
///
/// All engine tasks share one [`CancellationToken`]. When the deadline
/// passes the token is cancelled, still-running tasks drop their engine
/// future and finish, and the dispatcher detaches them. Engines that did not
/// answer in time get a synthesized `Timeout` result, so the returned set
/// always has exactly one entry per engine, in registration order.
#[derive(Debug, Clone)]
pub struct ScanDispatcher {
    engines: Vec<ArcEngine>,
    config: DispatcherConfig,
}

impl ScanDispatcher {
    /// Creates a dispatcher. At least one engine is required.
    pub fn new(engines: Vec<ArcEngine>, config: DispatcherConfig) -> Result<Self, ScanError> {
        if engines.is_empty() {
            return Err(ScanError::NoEngines);
        }
        Ok(Self { engines, config })
    }

    /// Returns the registered engines.
    pub fn engines(&self) -> &[ArcEngine] {
        &self.engines
    }

    /// Returns the number of registered engines.
    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Scans `file` with every engine.
    ///
    /// The file stays alive until the last engine task has finished or been
    /// abandoned; a staged upload copy is removed when the caller drops its
    /// own handle afterwards.
    pub async fn dispatch(&self, file: Arc<FileRef>) -> Vec<EngineResult> {
        let started = Instant::now();
        let token = CancellationToken::new();
        let mut tasks = JoinSet::new();

        for (index, engine) in self.engines.iter().enumerate() {
            let engine = Arc::clone(engine);
            let file = Arc::clone(&file);
            let token = token.clone();

            tasks.spawn(async move {
                let task_started = Instant::now();
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        let error = EngineError::cancelled(engine.name());
                        EngineResult::failed(engine.name(), &error, task_started.elapsed())
                    }
                    result = engine.scan(&file) => result,
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<EngineResult>> = vec![None; self.engines.len()];
        let deadline = tokio::time::sleep(self.config.deadline);
        tokio::pin!(deadline);
        let mut deadline_hit = false;

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((index, result))) => {
                        crate::audit::emit_engine_result(file.name(), &result);
                        slots[index] = Some(result);
                    }
                    Some(Err(e)) => {
                        tracing::error!(file = %file.name(), error = %e, "Engine task panicked");
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        if deadline_hit {
            token.cancel();
            tracing::warn!(
                file = %file.name(),
                deadline_ms = self.config.deadline.as_millis() as u64,
                outstanding = tasks.len(),
                "Dispatch deadline exceeded, abandoning outstanding engines"
            );
            tasks.detach_all();
        }

        let elapsed = started.elapsed();
        let results: Vec<EngineResult> = slots
            .into_iter()
            .zip(&self.engines)
            .map(|(slot, engine)| {
                slot.unwrap_or_else(|| {
                    let error = if deadline_hit {
                        EngineError::timeout(
                            engine.name(),
                            format!("dispatch deadline of {:?} exceeded", self.config.deadline),
                        )
                    } else {
                        EngineError::unavailable(engine.name(), "engine task panicked")
                    };
                    let result = EngineResult::failed(engine.name(), &error, elapsed);
                    crate::audit::emit_engine_result(file.name(), &result);
                    result
                })
            })
            .collect();

        tracing::debug!(
            file = %file.name(),
            engine_count = results.len(),
            failed = results.iter().filter(|r| r.is_error()).count(),
            duration_ms = elapsed.as_millis() as u64,
            "Dispatch finished"
        );

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EngineErrorKind, EngineVerdict};
    use crate::engines::MockEngine;
    use tempfile::TempDir;

    fn sample(dir: &TempDir) -> Arc<FileRef> {
        Arc::new(FileRef::from_upload_in(dir.path(), "sample.bin", b"payload").unwrap())
    }

    #[test]
    fn test_requires_engines() {
        let result = ScanDispatcher::new(Vec::new(), DispatcherConfig::default());
        assert!(matches!(result, Err(ScanError::NoEngines)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engines_run_concurrently() {
        let dir = TempDir::new().unwrap();
        let engines: Vec<ArcEngine> = vec![
            Arc::new(MockEngine::clean("a").with_latency(Duration::from_secs(10))),
            Arc::new(MockEngine::clean("b").with_latency(Duration::from_secs(10))),
            Arc::new(MockEngine::clean("c").with_latency(Duration::from_secs(10))),
        ];
        let dispatcher = ScanDispatcher::new(engines, DispatcherConfig::default()).unwrap();

        let started = Instant::now();
        let results = dispatcher.dispatch(sample(&dir)).await;

        assert_eq!(results.len(), 3);
        assert!(started.elapsed() < Duration::from_secs(11));
        let names: Vec<_> = results.iter().map(|r| r.engine_id.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_synthesizes_timeouts() {
        let dir = TempDir::new().unwrap();
        let slow = Arc::new(MockEngine::infected("slow", "late").with_latency(Duration::from_secs(600)));
        let engines: Vec<ArcEngine> = vec![
            Arc::new(MockEngine::clean("fast")),
            slow.clone() as ArcEngine,
        ];
        let dispatcher = ScanDispatcher::new(
            engines,
            DispatcherConfig::new().with_deadline(Duration::from_secs(30)),
        )
        .unwrap();

        let started = Instant::now();
        let results = dispatcher.dispatch(sample(&dir)).await;

        assert!(started.elapsed() < Duration::from_secs(31));
        assert_eq!(results[0].verdict, EngineVerdict::Clean);
        assert_eq!(results[1].verdict, EngineVerdict::Error);
        assert_eq!(results[1].error_kind, Some(EngineErrorKind::Timeout));
        assert_eq!(slow.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_staged_copy_outlives_dispatch_only_while_held() {
        let dir = TempDir::new().unwrap();
        let dispatcher = ScanDispatcher::new(
            vec![Arc::new(MockEngine::clean("a")) as ArcEngine],
            DispatcherConfig::default(),
        )
        .unwrap();

        let file = sample(&dir);
        let path = file.path().to_path_buf();
        dispatcher.dispatch(Arc::clone(&file)).await;

        assert!(path.exists());
        assert_eq!(Arc::strong_count(&file), 1);
        drop(file);
        assert!(!path.exists());
    }
}
