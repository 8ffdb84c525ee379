//! Raw feed row validation and normalization.
//!
//! F1 bounds and latency positivity are the hard gates. False-positive rate
//! and efficiency are lower-confidence columns: anything unparseable becomes
//! `0` instead of rejecting the row.

use std::collections::HashMap;

use crate::{DomainComparison, MetricSet, ValidationError};

pub const DOMAIN: &str = "domain";
pub const BASELINE_F1: &str = "baseline_f1";
pub const BASELINE_LATENCY: &str = "baseline_latency";
pub const BASELINE_FALSE_POS: &str = "baseline_false_pos";
pub const BASELINE_EFFICIENCY: &str = "baseline_efficiency";
pub const UTL_F1: &str = "utl_f1";
pub const UTL_LATENCY: &str = "utl_latency";
pub const UTL_FALSE_POS: &str = "utl_false_pos";
pub const UTL_EFFICIENCY: &str = "utl_efficiency";
pub const TIMESTAMP: &str = "timestamp";

/// Untyped feed record keyed by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    fields: HashMap<String, String>,
}

impl RawRow {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Trimmed domain name, `None` when missing or blank.
    pub fn domain(&self) -> Option<&str> {
        self.get(DOMAIN)
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
    }
}

/// Returns `true` when the row passes the F1 and latency gates.
pub fn validate(row: &RawRow) -> bool {
    check(row).is_ok()
}

/// Explains why a row fails the F1 and latency gates.
pub fn check(row: &RawRow) -> Result<(), ValidationError> {
    for field in [BASELINE_F1, UTL_F1] {
        let in_range = parse_float(row.get(field)).is_some_and(|v| (0.0..=1.0).contains(&v));
        if !in_range {
            return Err(ValidationError::FractionOutOfRange { field });
        }
    }

    for field in [BASELINE_LATENCY, UTL_LATENCY] {
        if !parse_leading_int(row.get(field)).is_some_and(|v| v > 0) {
            return Err(ValidationError::NonPositiveLatency { field });
        }
    }

    Ok(())
}

/// Converts a row into a typed comparison.
pub fn normalize(row: &RawRow) -> Result<DomainComparison, ValidationError> {
    check(row)?;
    let domain = row.domain().ok_or(ValidationError::EmptyDomain)?;

    let baseline = metric_set(
        row,
        BASELINE_F1,
        BASELINE_LATENCY,
        BASELINE_FALSE_POS,
        BASELINE_EFFICIENCY,
    )?;
    let candidate = metric_set(row, UTL_F1, UTL_LATENCY, UTL_FALSE_POS, UTL_EFFICIENCY)?;

    let timestamp = row
        .get(TIMESTAMP)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned);

    DomainComparison::new(domain, baseline, candidate, timestamp)
}

fn metric_set(
    row: &RawRow,
    f1: &'static str,
    latency: &'static str,
    false_pos: &'static str,
    efficiency: &'static str,
) -> Result<MetricSet, ValidationError> {
    let latency_ms = parse_leading_int(row.get(latency))
        .and_then(|value| u64::try_from(value).ok())
        .unwrap_or(0);

    MetricSet::new(
        to_number(row.get(f1)),
        latency_ms,
        to_number(row.get(false_pos)),
        to_number(row.get(efficiency)),
    )
}

fn parse_float(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok()
}

/// Lenient numeric coercion: blank, unparseable, or non-finite becomes `0`.
fn to_number(raw: Option<&str>) -> f64 {
    parse_float(raw).filter(|value| value.is_finite()).unwrap_or(0.0)
}

/// Parses the leading integer of a string, ignoring any trailing text.
///
/// `"250"` and `"250.9"` and `"250ms"` all yield `250`; `"ms"` yields `None`.
pub(crate) fn parse_leading_int(raw: Option<&str>) -> Option<i64> {
    let trimmed = raw?.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let magnitude = digits[..end].parse::<i64>().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(overrides: &[(&str, &str)]) -> RawRow {
        let mut fields: HashMap<String, String> = [
            (DOMAIN, " Finance "),
            (BASELINE_F1, "0.72"),
            (BASELINE_LATENCY, "250"),
            (BASELINE_FALSE_POS, "0.12"),
            (BASELINE_EFFICIENCY, "0.65"),
            (UTL_F1, "0.86"),
            (UTL_LATENCY, "47"),
            (UTL_FALSE_POS, "0.04"),
            (UTL_EFFICIENCY, "0.92"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        for (key, value) in overrides {
            fields.insert((*key).to_owned(), (*value).to_owned());
        }
        RawRow::from_pairs(fields)
    }

    #[test]
    fn normalizes_valid_row() {
        let comparison = normalize(&row(&[(TIMESTAMP, "2025-10-16T12:00:00Z")])).expect("valid");

        assert_eq!(comparison.domain, "Finance");
        assert_eq!(comparison.baseline.latency_ms, 250);
        assert_eq!(comparison.candidate.f1_score, 0.86);
        assert_eq!(comparison.timestamp.as_deref(), Some("2025-10-16T12:00:00Z"));
    }

    #[test]
    fn rejects_f1_above_one_and_zero_latency() {
        assert!(!validate(&row(&[(BASELINE_F1, "1.5")])));
        assert!(!validate(&row(&[(UTL_F1, "-0.1")])));
        assert!(!validate(&row(&[(UTL_LATENCY, "0")])));
        assert!(!validate(&row(&[(BASELINE_LATENCY, "fast")])));
        assert!(!validate(&row(&[(UTL_F1, "")])));
    }

    #[test]
    fn f1_bounds_are_inclusive() {
        assert!(validate(&row(&[(BASELINE_F1, "0"), (UTL_F1, "1")])));
    }

    #[test]
    fn soft_fields_fall_back_to_zero() {
        let comparison = normalize(&row(&[
            (BASELINE_FALSE_POS, "n/a"),
            (UTL_EFFICIENCY, ""),
            (UTL_FALSE_POS, "inf"),
        ]))
        .expect("soft fields never reject");

        assert_eq!(comparison.baseline.false_positive_rate, 0.0);
        assert_eq!(comparison.candidate.efficiency, 0.0);
        assert_eq!(comparison.candidate.false_positive_rate, 0.0);
    }

    #[test]
    fn decimal_latency_is_truncated() {
        let comparison = normalize(&row(&[(BASELINE_LATENCY, "250.9")])).expect("valid");
        assert_eq!(comparison.baseline.latency_ms, 250);
    }

    #[test]
    fn blank_timestamp_is_absent() {
        let comparison = normalize(&row(&[(TIMESTAMP, "  ")])).expect("valid");
        assert!(!comparison.has_upstream_timestamp());
    }

    #[test]
    fn blank_domain_is_rejected() {
        assert_eq!(
            normalize(&row(&[(DOMAIN, "   ")])),
            Err(ValidationError::EmptyDomain)
        );
    }

    #[test]
    fn normalize_is_idempotent_over_its_output() {
        let first = normalize(&row(&[])).expect("valid");
        let f1 = first.baseline.f1_score.to_string();
        let latency = first.baseline.latency_ms.to_string();
        let fpr = first.baseline.false_positive_rate.to_string();
        let eff = first.baseline.efficiency.to_string();
        let utl_f1 = first.candidate.f1_score.to_string();
        let utl_latency = first.candidate.latency_ms.to_string();
        let utl_fpr = first.candidate.false_positive_rate.to_string();
        let utl_eff = first.candidate.efficiency.to_string();

        let second = normalize(&RawRow::from_pairs([
            (DOMAIN, first.domain.as_str()),
            (BASELINE_F1, f1.as_str()),
            (BASELINE_LATENCY, latency.as_str()),
            (BASELINE_FALSE_POS, fpr.as_str()),
            (BASELINE_EFFICIENCY, eff.as_str()),
            (UTL_F1, utl_f1.as_str()),
            (UTL_LATENCY, utl_latency.as_str()),
            (UTL_FALSE_POS, utl_fpr.as_str()),
            (UTL_EFFICIENCY, utl_eff.as_str()),
        ]))
        .expect("normalized output stays valid");

        assert_eq!(first, second);
    }

    #[test]
    fn leading_int_matches_lenient_integer_parsing() {
        assert_eq!(parse_leading_int(Some(" 42 ")), Some(42));
        assert_eq!(parse_leading_int(Some("12abc")), Some(12));
        assert_eq!(parse_leading_int(Some("-3")), Some(-3));
        assert_eq!(parse_leading_int(Some("abc")), None);
        assert_eq!(parse_leading_int(Some("")), None);
        assert_eq!(parse_leading_int(None), None);
    }
}
