//! Scan dispatch and verdict aggregation.
//!
//! The [`ScanDispatcher`] fans one file out to every engine and fans the
//! results back in under a global deadline; [`aggregate`] reduces the
//! result set to one verdict.

mod aggregate;
mod dispatcher;

pub use aggregate::aggregate;
pub use dispatcher::{DispatcherConfig, ScanDispatcher};
