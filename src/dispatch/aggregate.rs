//! Verdict aggregation.

use crate::core::{AggregateVerdict, EngineResult};

/// Reduces a set of engine results to one verdict.
///
/// Precedence is Infected > Indeterminate > Clean: one detection wins over
/// any number of clean or failed engines, and a single failure keeps an
/// otherwise clean set from being reported as Clean. The result does not
/// depend on the order of `results`.
///
/// An empty set is Indeterminate since no engine vouched for the file.
pub fn aggregate(results: &[EngineResult]) -> AggregateVerdict {
    if results.iter().any(EngineResult::is_infected) {
        AggregateVerdict::Infected
    } else if results.is_empty() || results.iter().any(EngineResult::is_error) {
        AggregateVerdict::Indeterminate
    } else {
        AggregateVerdict::Clean
    }
}
