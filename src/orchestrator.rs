//! The orchestrator owns every piece of mutable state: scan history, stats,
//! the watch registry and the quarantine. Scans from uploads, explicit paths
//! and watch sessions all go through [`Orchestrator::scan_file`].

use crate::alert::{Alert, AlertSink, WebhookAlertSink};
use crate::config::Config;
use crate::core::error::{QuarantineResult, WatchResult};
use crate::core::{
    AggregateVerdict, ArcEngine, Engine, FileHasher, FileRef, QuarantineError, ScanAction,
    ScanError, ScanRecord,
};
use crate::dispatch::{DispatcherConfig, ScanDispatcher};
use crate::history::{HistoryStore, Stats};
use crate::quarantine::{FilesystemQuarantine, QuarantineEntry, QuarantineStore};
use crate::watch::{FileHandler, WatchRegistry, WatchSession};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// What happened to an infected file after the scan.
#[derive(Debug)]
pub enum QuarantineOutcome {
    /// The verdict was not Infected.
    NotRequired,
    /// The file was moved into isolation.
    Quarantined(QuarantineEntry),
    /// The move failed; the file is still at its original path.
    Failed(QuarantineError),
}

/// Result of one scan request.
#[derive(Debug)]
pub struct ScanReport {
    /// The record stored in history.
    pub record: ScanRecord,
    /// Quarantine result for the file.
    pub quarantine: QuarantineOutcome,
    /// Stats right after this record was added.
    pub stats: Stats,
}

impl ScanReport {
    /// Returns the aggregate verdict.
    pub fn verdict(&self) -> AggregateVerdict {
        self.record.aggregate_verdict
    }

    /// Returns `true` if the file was moved into quarantine.
    pub fn is_quarantined(&self) -> bool {
        matches!(self.quarantine, QuarantineOutcome::Quarantined(_))
    }

    /// Returns the quarantine failure, if any.
    pub fn quarantine_error(&self) -> Option<&QuarantineError> {
        match &self.quarantine {
            QuarantineOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Builder for creating an [`Orchestrator`].
pub struct OrchestratorBuilder {
    engines: Vec<ArcEngine>,
    dispatcher: DispatcherConfig,
    quarantine: Option<Arc<dyn QuarantineStore>>,
    history: Option<HistoryStore>,
    alerts: Option<Arc<dyn AlertSink>>,
    upload_dir: Option<PathBuf>,
}

impl OrchestratorBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            engines: Vec::new(),
            dispatcher: DispatcherConfig::default(),
            quarantine: None,
            history: None,
            alerts: None,
            upload_dir: None,
        }
    }

    /// Adds an engine.
    pub fn add_engine<E: Engine + 'static>(mut self, engine: E) -> Self {
        self.engines.push(Arc::new(engine));
        self
    }

    /// Adds an engine wrapped in an Arc.
    pub fn add_arc_engine(mut self, engine: ArcEngine) -> Self {
        self.engines.push(engine);
        self
    }

    /// Sets the dispatcher configuration.
    pub fn with_dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher = config;
        self
    }

    /// Sets the quarantine store.
    pub fn with_quarantine<Q: QuarantineStore + 'static>(mut self, store: Q) -> Self {
        self.quarantine = Some(Arc::new(store));
        self
    }

    /// Sets the history store. Defaults to an in-memory store.
    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    /// Sets the alert sink.
    pub fn with_alert_sink<S: AlertSink + 'static>(mut self, sink: S) -> Self {
        self.alerts = Some(Arc::new(sink));
        self
    }

    /// Sets the directory uploads are staged in. Defaults to the system
    /// temporary directory.
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    /// Builds the orchestrator.
    pub fn build(self) -> Result<Orchestrator, ScanError> {
        let dispatcher = ScanDispatcher::new(self.engines, self.dispatcher)?;
        let quarantine = self
            .quarantine
            .ok_or_else(|| ScanError::configuration("A quarantine store is required"))?;

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                dispatcher,
                quarantine,
                history: self.history.unwrap_or_default(),
                watches: WatchRegistry::new(),
                alerts: self.alerts,
                upload_dir: self.upload_dir,
                hasher: FileHasher::new(),
            }),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Inner {
    dispatcher: ScanDispatcher,
    quarantine: Arc<dyn QuarantineStore>,
    history: HistoryStore,
    watches: WatchRegistry,
    alerts: Option<Arc<dyn AlertSink>>,
    upload_dir: Option<PathBuf>,
    hasher: FileHasher,
}

/// Scan orchestrator. Cheap to clone; clones share all state.
///
/// # Example
///
/// ```rust,ignore
/// use scanwatch::engines::MockEngine;
/// use scanwatch::quarantine::FilesystemQuarantine;
/// use scanwatch::Orchestrator;
///
/// let orchestrator = Orchestrator::builder()
///     .add_engine(MockEngine::clean("local"))
///     .with_quarantine(FilesystemQuarantine::new("/var/lib/scanwatch/quarantine")?)
///     .build()?;
///
/// let report = orchestrator.scan_upload("invoice.pdf", &bytes).await?;
/// println!("{}", report.verdict());
/// ```
#[derive(Debug, Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Creates a new builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Builds an orchestrator from configuration: engines, quarantine,
    /// persisted history and the optional webhook.
    pub fn from_config(config: &Config) -> Result<Self, ScanError> {
        let quarantine = FilesystemQuarantine::for_user(
            &config.quarantine.user,
            config.quarantine.directory.as_deref(),
        )
        .map_err(|e| ScanError::configuration(format!("Quarantine unavailable: {}", e)))?;

        let history = match &config.history.path {
            Some(path) => HistoryStore::open(path)
                .map_err(|e| ScanError::configuration(format!("History unavailable: {}", e)))?,
            None => HistoryStore::in_memory(),
        };

        let mut builder = Self::builder()
            .with_dispatcher_config(config.dispatcher_config())
            .with_quarantine(quarantine)
            .with_history(history);
        for engine in config.build_engines()? {
            builder = builder.add_arc_engine(engine);
        }
        if let Some(url) = &config.alerts.webhook_url {
            let sink = WebhookAlertSink::new(
                url.clone(),
                Duration::from_secs(config.alerts.timeout_secs),
            )
            .map_err(|e| ScanError::configuration(e.to_string()))?;
            builder = builder.with_alert_sink(sink);
        }

        builder.build()
    }

    /// Scans uploaded bytes. The staged copy is deleted once the scan is
    /// done unless it was quarantined.
    pub async fn scan_upload(&self, name: &str, data: &[u8]) -> Result<ScanReport, ScanError> {
        let file = match &self.inner.upload_dir {
            Some(dir) => FileRef::from_upload_in(dir, name, data)?,
            None => FileRef::from_upload(name, data)?,
        };
        self.scan_file(file).await
    }

    /// Scans an existing file in place.
    pub async fn scan_path(&self, path: impl Into<PathBuf>) -> Result<ScanReport, ScanError> {
        self.scan_file(FileRef::from_path(path)?).await
    }

    /// Dispatches `file` to every engine, records the outcome, quarantines
    /// Infected files and raises an alert.
    ///
    /// Engine failures never fail the scan; they show up as `Error` results
    /// and an Indeterminate verdict. A quarantine failure is reported on the
    /// returned [`ScanReport`] and leaves the record's action at `None`.
    pub async fn scan_file(&self, file: FileRef) -> Result<ScanReport, ScanError> {
        let inner = &self.inner;
        let file = Arc::new(file);
        let scan_id = ScanRecord::new_id();

        let fingerprint = {
            let path = file.path().to_path_buf();
            let hasher = inner.hasher;
            tokio::task::spawn_blocking(move || {
                let hash = hasher.hash_file(&path)?;
                let size = std::fs::metadata(&path)?.len();
                Ok::<_, std::io::Error>((hash, size))
            })
            .await
            .map_err(|e| ScanError::internal(e.to_string()))?
        };
        let (file_hash, file_size) = match fingerprint {
            Ok((hash, size)) => (Some(hash), Some(size)),
            Err(e) => {
                tracing::warn!(file = %file.name(), error = %e, "Could not fingerprint file");
                (None, None)
            }
        };

        tracing::info!(
            scan_id = %scan_id,
            file = %file.name(),
            source = %file.source(),
            engines = inner.dispatcher.engine_count(),
            "Starting scan"
        );
        crate::audit::emit_scan_started(&scan_id, file.name(), file_hash.as_ref(), file.source());

        let results = inner.dispatcher.dispatch(Arc::clone(&file)).await;

        let mut record = ScanRecord::new(scan_id, file.name(), results).with_source(file.source());
        if !file.is_temporary() {
            record = record.with_file_path(file.path());
        }
        if let Some(hash) = file_hash {
            record = record.with_file_hash(hash);
        }
        if let Some(size) = file_size {
            record = record.with_file_size(size);
        }

        let quarantine = if record.is_infected() {
            match inner.quarantine.quarantine(&file, &record).await {
                Ok(entry) => {
                    record = record.with_action(ScanAction::Quarantined);
                    QuarantineOutcome::Quarantined(entry)
                }
                Err(e) => {
                    tracing::error!(
                        scan_id = %record.id,
                        file = %record.file_name,
                        error = %e,
                        "Infected file could not be quarantined"
                    );
                    QuarantineOutcome::Failed(e)
                }
            }
        } else {
            QuarantineOutcome::NotRequired
        };
        drop(file);

        let (stats, pending) = inner.history.insert(record.clone());
        if let Some(pending) = pending {
            if let Err(e) = tokio::task::spawn_blocking(move || pending.write_logged()).await {
                tracing::warn!(error = %e, "History writer task failed");
            }
        }

        tracing::info!(
            scan_id = %record.id,
            file = %record.file_name,
            verdict = %record.aggregate_verdict,
            action = %record.action,
            failed_engines = record.failed_engines().len(),
            "Scan completed"
        );
        crate::audit::emit_scan_record(&record);

        if record.is_infected() {
            self.raise_alert(&record);
        }

        Ok(ScanReport {
            record,
            quarantine,
            stats,
        })
    }

    fn raise_alert(&self, record: &ScanRecord) {
        let Some(sink) = self.inner.alerts.clone() else {
            return;
        };
        let alert = Alert::from_record(record);
        let scan_id = record.id.clone();

        tokio::spawn(async move {
            match sink.send(&alert).await {
                Ok(()) => crate::audit::emit_alert_dispatch(&scan_id, &alert.file_name, None),
                Err(e) => {
                    tracing::warn!(scan_id = %scan_id, error = %e, "Alert delivery failed");
                    crate::audit::emit_alert_dispatch(
                        &scan_id,
                        &alert.file_name,
                        Some(e.to_string().as_str()),
                    );
                }
            }
        });
    }

    /// Starts watching `folder`. Every regular file created in it is
    /// scanned like an upload.
    pub fn start_watch(&self, folder: impl AsRef<Path>) -> WatchResult<WatchSession> {
        let session = self
            .inner
            .watches
            .start(folder, watch_handler(Arc::downgrade(&self.inner)))?;
        self.sync_watched_folders();
        Ok(session)
    }

    /// Stops watching `folder`.
    pub fn stop_watch(&self, folder: impl AsRef<Path>) -> WatchResult<WatchSession> {
        let session = self.inner.watches.stop(folder)?;
        self.sync_watched_folders();
        Ok(session)
    }

    fn sync_watched_folders(&self) {
        let running = self.inner.watches.running_count() as u64;
        self.inner.history.set_watched_folders(running);
    }

    /// Returns the running watch sessions, oldest first.
    pub fn watch_sessions(&self) -> Vec<WatchSession> {
        self.inner.watches.sessions()
    }

    /// Returns the scan history.
    pub fn history(&self) -> &HistoryStore {
        &self.inner.history
    }

    /// Returns up to `limit` records, newest first.
    pub fn recent_scans(&self, limit: usize) -> Vec<ScanRecord> {
        self.inner.history.recent(limit)
    }

    /// Returns the current stats.
    pub fn stats(&self) -> Stats {
        self.inner.history.stats()
    }

    /// Lists quarantined files, newest first.
    pub async fn quarantine_entries(&self) -> QuarantineResult<Vec<QuarantineEntry>> {
        self.inner.quarantine.entries().await
    }

    /// Returns the isolation directory.
    pub fn quarantine_location(&self) -> &Path {
        self.inner.quarantine.location()
    }

    /// Returns the engines in dispatch order.
    pub fn engine_names(&self) -> Vec<String> {
        self.inner
            .dispatcher
            .engines()
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    /// Stops every watch session and flushes history.
    pub fn shutdown(&self) -> Vec<WatchSession> {
        let stopped = self.inner.watches.shutdown();
        self.sync_watched_folders();
        if let Err(e) = self.inner.history.save() {
            tracing::warn!(error = %e, "Failed to flush scan history on shutdown");
        }
        tracing::info!(sessions = stopped.len(), "Orchestrator shut down");
        stopped
    }
}

/// Handler passed to the watch registry. Holds a weak reference so a
/// running session does not keep the orchestrator alive.
fn watch_handler(inner: Weak<Inner>) -> FileHandler {
    Arc::new(move |path: PathBuf| {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let orchestrator = Orchestrator { inner };

        tokio::spawn(async move {
            let file = match FileRef::from_watch_event(&path) {
                Ok(file) => file,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Created file vanished before scan");
                    return;
                }
            };
            if let Err(e) = orchestrator.scan_file(file).await {
                tracing::warn!(path = %path.display(), error = %e, "Watch-triggered scan failed");
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineError;
    use crate::engines::MockEngine;
    use tempfile::TempDir;

    fn orchestrator(dir: &TempDir, engines: Vec<MockEngine>) -> Orchestrator {
        let mut builder = Orchestrator::builder()
            .with_quarantine(FilesystemQuarantine::new(dir.path().join("quarantine")).unwrap())
            .with_upload_dir(dir.path());
        for engine in engines {
            builder = builder.add_engine(engine);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_builder_requires_engines_and_quarantine() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Orchestrator::builder()
                .with_quarantine(FilesystemQuarantine::new(dir.path()).unwrap())
                .build(),
            Err(ScanError::NoEngines)
        ));
        assert!(matches!(
            Orchestrator::builder().add_engine(MockEngine::clean("a")).build(),
            Err(ScanError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_clean_upload_leaves_no_staged_copy() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir, vec![MockEngine::clean("a"), MockEngine::clean("b")]);

        let report = orch.scan_upload("notes.txt", b"hello").await.unwrap();

        assert_eq!(report.verdict(), AggregateVerdict::Clean);
        assert!(matches!(report.quarantine, QuarantineOutcome::NotRequired));
        assert_eq!(report.record.file_size, Some(5));
        assert!(report.record.file_path.is_none());
        assert_eq!(report.stats.files_scanned, 1);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("scanwatch-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_infected_path_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("dropper.exe");
        std::fs::write(&target, b"MZ").unwrap();
        let orch = orchestrator(
            &dir,
            vec![MockEngine::clean("a"), MockEngine::infected("b", "Trojan.X")],
        );

        let report = orch.scan_path(&target).await.unwrap();

        assert!(report.is_quarantined());
        assert_eq!(report.record.action, ScanAction::Quarantined);
        assert!(!target.exists());
        assert_eq!(orch.quarantine_entries().await.unwrap().len(), 1);
        assert_eq!(orch.stats().threats_detected, 1);
    }

    #[tokio::test]
    async fn test_missing_path() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir, vec![MockEngine::clean("a")]);

        let err = orch.scan_path(dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, ScanError::FileNotFound { .. }));
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_still_records() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(
            &dir,
            vec![
                MockEngine::clean("a"),
                MockEngine::failing("b", EngineError::unavailable("b", "down")),
            ],
        );

        let report = orch.scan_upload("x.bin", b"x").await.unwrap();

        assert_eq!(report.verdict(), AggregateVerdict::Indeterminate);
        assert_eq!(report.record.failed_engines().len(), 1);
        assert_eq!(orch.stats().files_scanned, 1);
        assert_eq!(orch.stats().threats_detected, 0);
    }

    #[tokio::test]
    async fn test_watch_counts_follow_sessions() {
        let dir = TempDir::new().unwrap();
        let inbox = dir.path().join("inbox");
        std::fs::create_dir(&inbox).unwrap();
        let orch = orchestrator(&dir, vec![MockEngine::clean("a")]);

        orch.start_watch(&inbox).unwrap();
        assert_eq!(orch.stats().watched_folders, 1);
        assert_eq!(orch.watch_sessions().len(), 1);

        let stopped = orch.shutdown();
        assert_eq!(stopped.len(), 1);
        assert_eq!(orch.stats().watched_folders, 0);
    }
}
