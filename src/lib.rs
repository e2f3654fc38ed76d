//! # Scanwatch
//!
//! Multi-engine malware scan orchestration with folder watching, quarantine
//! and an append-only scan history.
//!
//! ## Overview
//!
//! Scanwatch sends every file to all configured detection engines at once,
//! reduces their answers to one verdict and acts on it:
//!
//! - Submit uploaded bytes, existing paths, or files created in a watched folder
//! - Run local (`clamscan`) and remote (VirusTotal, MetaDefender, Hybrid Analysis) engines side by side
//! - Keep Infected, Clean and Indeterminate distinct when engines disagree or fail
//! - Move Infected files into an isolated quarantine
//! - Record every scan and derive protection statistics
//! - Emit structured audit events for compliance
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scanwatch::engines::MockEngine;
//! use scanwatch::quarantine::FilesystemQuarantine;
//! use scanwatch::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::builder()
//!         .add_engine(MockEngine::clean("local"))
//!         .with_quarantine(FilesystemQuarantine::new("/tmp/quarantine")?)
//!         .build()?;
//!
//!     let report = orchestrator.scan_upload("report.pdf", b"%PDF-1.7").await?;
//!     println!("{} -> {}", report.record.file_name, report.verdict());
//!
//!     orchestrator.start_watch("/srv/inbox")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Core**: Verdicts, records, the `Engine` trait and error types
//! - **Engines**: Adapter implementations and the remote poll driver
//! - **Dispatch**: Concurrent fan-out with a deadline, and verdict aggregation
//! - **Quarantine**: Isolation of infected files
//! - **Watch**: One session per watched folder
//! - **History**: Scan records and statistics
//! - **Alert**: Threat notifications
//! - **Audit**: Structured logging for compliance

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod alert;
pub mod audit;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod engines;
pub mod history;
pub mod orchestrator;
pub mod quarantine;
pub mod watch;

// Re-export commonly used types at the crate root
pub use crate::config::Config;
pub use crate::core::{
    AggregateVerdict, Engine, EngineResult, EngineVerdict, FileRef, ScanAction, ScanError,
    ScanRecord,
};
pub use crate::history::{HistoryStore, Stats};
pub use crate::orchestrator::{Orchestrator, OrchestratorBuilder, QuarantineOutcome, ScanReport};
pub use crate::quarantine::{QuarantineEntry, QuarantineStore};
pub use crate::watch::{WatchSession, WatchState};

/// Prelude module for convenient imports.
///
/// ```rust
/// use scanwatch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        AggregateVerdict, Detection, Engine, EngineError, EngineResult, EngineVerdict, FileRef,
        ScanAction, ScanError, ScanRecord,
    };
    pub use crate::dispatch::{aggregate, DispatcherConfig, ScanDispatcher};
    pub use crate::history::{HistoryStore, Stats};
    pub use crate::orchestrator::{Orchestrator, QuarantineOutcome, ScanReport};
    pub use crate::quarantine::{FilesystemQuarantine, QuarantineEntry, QuarantineStore};
    pub use crate::watch::{WatchSession, WatchState};
}
