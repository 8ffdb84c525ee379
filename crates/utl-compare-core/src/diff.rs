//! Per-domain deltas and magnitude ranking.

use crate::normalize::parse_leading_int;
use crate::{DiffRecord, DomainComparison, Metric, MetricDelta, RankedEntry};

pub const DEFAULT_TOP_N: usize = 12;

/// One [`DiffRecord`] per comparison, in input order.
pub fn diff(comparisons: &[DomainComparison]) -> Vec<DiffRecord> {
    comparisons
        .iter()
        .map(|comparison| DiffRecord {
            domain: comparison.domain.clone(),
            baseline: comparison.baseline,
            candidate: comparison.candidate,
            diff: MetricDelta::between(&comparison.baseline, &comparison.candidate),
        })
        .collect()
}

/// Largest absolute changes for `metric`, at most `top_n` entries.
///
/// Records with a blank domain or a non-finite delta are skipped. Equal
/// magnitudes keep their input order.
pub fn rank(records: &[DiffRecord], metric: Metric, top_n: usize) -> Vec<RankedEntry> {
    let mut entries = records
        .iter()
        .filter(|record| !record.domain.trim().is_empty())
        .map(|record| RankedEntry {
            domain: record.domain.clone(),
            baseline_value: record.baseline.value(metric),
            candidate_value: record.candidate.value(metric),
            delta: record.diff.value(metric),
        })
        .filter(|entry| entry.delta.is_finite())
        .collect::<Vec<_>>();

    // sort_by is stable
    entries.sort_by(|a, b| b.delta.abs().total_cmp(&a.delta.abs()));
    entries.truncate(top_n);
    entries
}

/// Coerces a raw `topN` parameter, defaulting to [`DEFAULT_TOP_N`] when it is
/// missing, non-numeric, or not positive.
pub fn parse_top_n(raw: Option<&str>) -> usize {
    parse_leading_int(raw)
        .filter(|value| *value > 0)
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(DEFAULT_TOP_N)
}
