//! Structured audit logging.
//!
//! Every scan, engine result, quarantine operation, watch transition and
//! alert dispatch is emitted as a `tracing` event on the
//! `scanwatch::audit` target, so a subscriber can route the audit trail
//! separately from operational logs.

mod events;

pub use events::{
    emit_alert_dispatch, emit_engine_result, emit_quarantine_operation, emit_scan_record,
    emit_scan_started, emit_watch_session, AuditEvent, EngineAuditEvent, QuarantineAuditEvent,
    ScanAuditEvent, WatchAuditEvent, AUDIT_TARGET,
};
