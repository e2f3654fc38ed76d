//! Audit event types and emission functions.

use crate::core::{EngineResult, FileHash, ScanRecord, ScanSource};
use crate::quarantine::QuarantineEntry;
use crate::watch::WatchSession;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracing target every audit event is emitted on.
pub const AUDIT_TARGET: &str = "scanwatch::audit";

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit event for a completed scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Scan record ID.
    pub scan_id: String,

    /// Declared file name.
    pub file_name: String,

    /// File hash (BLAKE3), if it could be computed.
    pub file_hash_blake3: Option<String>,

    /// Where the file came from.
    pub source: String,

    /// Aggregate verdict.
    pub verdict: String,

    /// Action taken.
    pub action: String,

    /// Engines that flagged the file.
    pub detected_by: Vec<String>,

    /// Engines that failed.
    pub failed_engines: Vec<String>,
}

impl From<&ScanRecord> for ScanAuditEvent {
    fn from(record: &ScanRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            scan_id: record.id.clone(),
            file_name: record.file_name.clone(),
            file_hash_blake3: record.file_hash.as_ref().map(|h| h.as_str().to_string()),
            source: record.source.to_string(),
            verdict: record.aggregate_verdict.as_str().to_string(),
            action: record.action.as_str().to_string(),
            detected_by: record
                .detecting_engines()
                .into_iter()
                .map(str::to_string)
                .collect(),
            failed_engines: record
                .failed_engines()
                .into_iter()
                .map(|r| r.engine_id.clone())
                .collect(),
        }
    }
}

impl AuditEvent for ScanAuditEvent {
    fn event_type(&self) -> &'static str {
        "scan_completed"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Audit event for one engine's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Declared file name.
    pub file_name: String,
    /// Engine name.
    pub engine: String,
    /// Engine verdict.
    pub verdict: String,
    /// Failure classification, if any.
    pub error_kind: Option<String>,
    /// Engine latency in milliseconds.
    pub latency_ms: u64,
}

impl EngineAuditEvent {
    fn new(file_name: &str, result: &EngineResult) -> Self {
        Self {
            timestamp: Utc::now(),
            file_name: file_name.to_string(),
            engine: result.engine_id.clone(),
            verdict: result.verdict.as_str().to_string(),
            error_kind: result.error_kind.map(|k| k.to_string()),
            latency_ms: result.latency.as_millis() as u64,
        }
    }
}

impl AuditEvent for EngineAuditEvent {
    fn event_type(&self) -> &'static str {
        "engine_result"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Audit event for a quarantine operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Quarantine ID.
    pub quarantine_id: String,

    /// Scan record that triggered the move.
    pub scan_id: String,

    /// File hash.
    pub file_hash_blake3: String,

    /// Where the file was.
    pub original_path: String,

    /// Where the file was moved to.
    pub quarantine_path: String,

    /// Whether the move succeeded.
    pub success: bool,

    /// Failure reason.
    pub reason: Option<String>,
}

impl AuditEvent for QuarantineAuditEvent {
    fn event_type(&self) -> &'static str {
        "quarantine_operation"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Audit event for a watch session transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Watched folder.
    pub folder_path: String,
    /// State entered.
    pub state: String,
    /// When the session started.
    pub started_at: DateTime<Utc>,
}

impl From<&WatchSession> for WatchAuditEvent {
    fn from(session: &WatchSession) -> Self {
        Self {
            timestamp: Utc::now(),
            folder_path: session.folder_path.display().to_string(),
            state: session.state.as_str().to_string(),
            started_at: session.started_at,
        }
    }
}

impl AuditEvent for WatchAuditEvent {
    fn event_type(&self) -> &'static str {
        "watch_session"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for a scan starting.
pub fn emit_scan_started(scan_id: &str, file_name: &str, file_hash: Option<&FileHash>, source: ScanSource) {
    tracing::info!(
        target: "scanwatch::audit",
        event_type = "scan_started",
        scan_id = %scan_id,
        file_name = %file_name,
        file_hash_blake3 = ?file_hash.map(FileHash::as_str),
        source = %source,
        "Scan started"
    );
}

/// Emits an audit event for one engine result.
pub fn emit_engine_result(file_name: &str, result: &EngineResult) {
    let event = EngineAuditEvent::new(file_name, result);
    tracing::info!(
        target: "scanwatch::audit",
        event_type = event.event_type(),
        file_name = %event.file_name,
        engine = %event.engine,
        verdict = %event.verdict,
        error_kind = ?event.error_kind,
        latency_ms = event.latency_ms,
        "Engine result"
    );
}

/// Emits an audit event for a completed scan record.
pub fn emit_scan_record(record: &ScanRecord) {
    let event = ScanAuditEvent::from(record);
    tracing::info!(
        target: "scanwatch::audit",
        event_type = event.event_type(),
        scan_id = %event.scan_id,
        file_name = %event.file_name,
        file_hash_blake3 = ?event.file_hash_blake3,
        source = %event.source,
        verdict = %event.verdict,
        action = %event.action,
        detected_by = ?event.detected_by,
        failed_engines = ?event.failed_engines,
        engine_count = record.engine_count(),
        "Scan completed"
    );
}

/// Emits an audit event for a quarantine move, successful or not.
pub fn emit_quarantine_operation(entry: &QuarantineEntry, success: bool, reason: Option<&str>) {
    let event = QuarantineAuditEvent {
        timestamp: Utc::now(),
        quarantine_id: entry.id.to_string(),
        scan_id: entry.triggering_scan_id.clone(),
        file_hash_blake3: entry.file_hash.as_str().to_string(),
        original_path: entry.original_path.display().to_string(),
        quarantine_path: entry.quarantine_path.display().to_string(),
        success,
        reason: reason.map(str::to_string),
    };

    if success {
        tracing::info!(
            target: "scanwatch::audit",
            event_type = event.event_type(),
            quarantine_id = %event.quarantine_id,
            scan_id = %event.scan_id,
            file_hash_blake3 = %event.file_hash_blake3,
            original_path = %event.original_path,
            quarantine_path = %event.quarantine_path,
            file_size = entry.file_size,
            success = true,
            "File quarantined"
        );
    } else {
        tracing::warn!(
            target: "scanwatch::audit",
            event_type = event.event_type(),
            quarantine_id = %event.quarantine_id,
            scan_id = %event.scan_id,
            file_hash_blake3 = %event.file_hash_blake3,
            original_path = %event.original_path,
            success = false,
            reason = ?event.reason,
            "Quarantine failed"
        );
    }
}

/// Emits an audit event for a watch session entering a state.
pub fn emit_watch_session(session: &WatchSession) {
    let event = WatchAuditEvent::from(session);
    tracing::info!(
        target: "scanwatch::audit",
        event_type = event.event_type(),
        folder_path = %event.folder_path,
        state = %event.state,
        started_at = %event.started_at,
        "Watch session {}",
        event.state
    );
}

/// Emits an audit event for an alert hand-off.
pub fn emit_alert_dispatch(scan_id: &str, file_name: &str, error: Option<&str>) {
    match error {
        None => tracing::info!(
            target: "scanwatch::audit",
            event_type = "alert_dispatch",
            scan_id = %scan_id,
            file_name = %file_name,
            delivered = true,
            "Alert delivered"
        ),
        Some(error) => tracing::warn!(
            target: "scanwatch::audit",
            event_type = "alert_dispatch",
            scan_id = %scan_id,
            file_name = %file_name,
            delivered = false,
            error = %error,
            "Alert delivery failed"
        ),
    }
}
