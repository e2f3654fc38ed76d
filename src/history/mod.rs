//! Scan history and statistics.

mod stats;
mod store;

pub use stats::{protection_rate, Stats};
pub use store::{HistoryStore, PendingWrite};
