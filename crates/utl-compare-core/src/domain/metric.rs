use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// The fixed metric set compared between Baseline and Framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    F1Score,
    LatencyMs,
    FalsePositiveRate,
    Efficiency,
}

impl Metric {
    pub const ALL: [Self; 4] = [
        Self::F1Score,
        Self::LatencyMs,
        Self::FalsePositiveRate,
        Self::Efficiency,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::F1Score => "f1_score",
            Self::LatencyMs => "latency_ms",
            Self::FalsePositiveRate => "false_positive_rate",
            Self::Efficiency => "efficiency",
        }
    }

    /// Human-readable label used in summaries.
    pub const fn label(self) -> &'static str {
        match self {
            Self::F1Score => "F1 score",
            Self::LatencyMs => "latency (ms)",
            Self::FalsePositiveRate => "false positive rate",
            Self::Efficiency => "efficiency",
        }
    }

    /// Whether a lower value is the better outcome for this metric.
    pub const fn lower_is_better(self) -> bool {
        matches!(self, Self::LatencyMs | Self::FalsePositiveRate)
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|metric| metric.as_str() == value)
            .ok_or_else(|| ValidationError::UnknownMetric {
                value: value.to_owned(),
            })
    }
}

/// One system's measurements for a domain.
///
/// [`MetricSet::new`] enforces the F1 and latency bounds and requires the
/// remaining two fields to be finite. Fields are public, so a struct literal
/// skips those checks; keep literals to values known to satisfy them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub f1_score: f64,
    pub latency_ms: u64,
    pub false_positive_rate: f64,
    pub efficiency: f64,
}

impl MetricSet {
    pub fn new(
        f1_score: f64,
        latency_ms: u64,
        false_positive_rate: f64,
        efficiency: f64,
    ) -> Result<Self, ValidationError> {
        validate_fraction("f1_score", f1_score)?;
        if latency_ms == 0 {
            return Err(ValidationError::NonPositiveLatency {
                field: "latency_ms",
            });
        }
        validate_finite("false_positive_rate", false_positive_rate)?;
        validate_finite("efficiency", efficiency)?;

        Ok(Self {
            f1_score,
            latency_ms,
            false_positive_rate,
            efficiency,
        })
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::F1Score => self.f1_score,
            Metric::LatencyMs => self.latency_ms as f64,
            Metric::FalsePositiveRate => self.false_positive_rate,
            Metric::Efficiency => self.efficiency,
        }
    }
}

/// Signed per-metric difference `candidate - baseline`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub f1_score: f64,
    pub latency_ms: i64,
    pub false_positive_rate: f64,
    pub efficiency: f64,
}

impl MetricDelta {
    pub fn between(baseline: &MetricSet, candidate: &MetricSet) -> Self {
        Self {
            f1_score: candidate.f1_score - baseline.f1_score,
            latency_ms: candidate.latency_ms as i64 - baseline.latency_ms as i64,
            false_positive_rate: candidate.false_positive_rate - baseline.false_positive_rate,
            efficiency: candidate.efficiency - baseline.efficiency,
        }
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::F1Score => self.f1_score,
            Metric::LatencyMs => self.latency_ms as f64,
            Metric::FalsePositiveRate => self.false_positive_rate,
            Metric::Efficiency => self.efficiency,
        }
    }
}

fn validate_fraction(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::FractionOutOfRange { field })
    }
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFiniteValue { field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_metric_name() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>(), Ok(metric));
        }
    }

    #[test]
    fn unknown_metric_lists_allowed_names() {
        let err = "accuracy".parse::<Metric>().expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Unknown metric 'accuracy'. Allowed: f1_score, latency_ms, false_positive_rate, efficiency"
        );
    }

    #[test]
    fn metric_set_rejects_out_of_range_f1_and_zero_latency() {
        assert!(matches!(
            MetricSet::new(1.5, 100, 0.1, 0.5),
            Err(ValidationError::FractionOutOfRange { field: "f1_score" })
        ));
        assert!(matches!(
            MetricSet::new(f64::NAN, 100, 0.1, 0.5),
            Err(ValidationError::FractionOutOfRange { .. })
        ));
        assert!(matches!(
            MetricSet::new(0.5, 0, 0.1, 0.5),
            Err(ValidationError::NonPositiveLatency { .. })
        ));
    }

    #[test]
    fn latency_delta_can_be_negative() {
        let baseline = MetricSet::new(0.72, 250, 0.12, 0.65).expect("valid");
        let candidate = MetricSet::new(0.86, 47, 0.04, 0.92).expect("valid");

        let delta = MetricDelta::between(&baseline, &candidate);

        assert_eq!(delta.latency_ms, -203);
        assert_eq!(delta.value(Metric::LatencyMs), -203.0);
        assert!((delta.f1_score - 0.14).abs() < 1e-9);
    }
}
