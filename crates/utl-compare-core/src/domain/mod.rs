//! # Domain Models
//!
//! Strongly-typed comparison records. Raw feed rows are converted into these
//! types by [`crate::normalize`] and never travel further as strings.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Metric`] | One of the four compared metric names |
//! | [`MetricSet`] | One system's measurements for a domain |
//! | [`MetricDelta`] | Signed `candidate - baseline` per metric |
//! | [`DomainComparison`] | Baseline and Framework measurements for a domain |
//! | [`DiffRecord`] | Comparison plus deltas |
//! | [`RankedEntry`] | Ranking output for a single metric |
//! | [`UtcDateTime`] | UTC timestamp |

mod comparison;
mod metric;
mod timestamp;

pub use comparison::{DiffRecord, DomainComparison, RankedEntry};
pub use metric::{Metric, MetricDelta, MetricSet};
pub use timestamp::UtcDateTime;
