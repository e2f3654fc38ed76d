//! Detection engine implementations.
//!
//! This module contains implementations of the `Engine` trait.
//!
//! ## Available Engines
//!
//! - [`mock`] - A mock engine for testing
//! - [`clamscan`] - ClamAV via the `clamscan` command
//! - [`virustotal`] - VirusTotal v3 API
//! - [`metadefender`] - MetaDefender Cloud v4 API
//! - [`hybrid_analysis`] - Hybrid Analysis sandbox API
//!
//! The three remote engines share the submit-then-poll loop in [`remote`]
//! and only implement [`RemoteProvider`].
//!
//! ## Implementing a Custom Remote Engine
//!
//! ```rust,ignore
//! use scanwatch::core::{Detection, EngineError, FileRef};
//! use scanwatch::engines::{PollPolicy, PollStatus, RemoteEngine, RemoteProvider};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! pub struct MySandbox;
//!
//! #[async_trait]
//! impl RemoteProvider for MySandbox {
//!     fn name(&self) -> &str {
//!         "my-sandbox"
//!     }
//!
//!     async fn submit(&self, file: &FileRef) -> Result<String, EngineError> {
//!         todo!()
//!     }
//!
//!     async fn poll(&self, job_id: &str) -> Result<PollStatus, EngineError> {
//!         todo!()
//!     }
//! }
//!
//! let engine = RemoteEngine::new(MySandbox, PollPolicy::default());
//! ```

pub mod clamscan;
pub mod hybrid_analysis;
pub mod metadefender;
pub mod mock;
pub mod remote;
pub mod virustotal;

// Re-exports
pub use clamscan::{ClamscanConfig, ClamscanEngine};
pub use hybrid_analysis::HybridAnalysisProvider;
pub use metadefender::MetaDefenderProvider;
pub use mock::MockEngine;
pub use remote::{PollPolicy, PollStatus, RemoteConfig, RemoteEngine, RemoteProvider};
pub use virustotal::VirusTotalProvider;
