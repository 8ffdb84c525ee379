use serde::{Deserialize, Serialize};

use crate::{MetricDelta, MetricSet, ValidationError};

/// Validated Baseline vs Framework measurements for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainComparison {
    pub domain: String,
    pub baseline: MetricSet,
    pub candidate: MetricSet,
    /// Upstream-provided timestamp; absent for fallback data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl DomainComparison {
    pub fn new(
        domain: impl AsRef<str>,
        baseline: MetricSet,
        candidate: MetricSet,
        timestamp: Option<String>,
    ) -> Result<Self, ValidationError> {
        let domain = domain.as_ref().trim();
        if domain.is_empty() {
            return Err(ValidationError::EmptyDomain);
        }

        Ok(Self {
            domain: domain.to_owned(),
            baseline,
            candidate,
            timestamp,
        })
    }

    pub fn has_upstream_timestamp(&self) -> bool {
        self.timestamp.is_some()
    }
}

/// Comparison plus its per-metric deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub domain: String,
    pub baseline: MetricSet,
    pub candidate: MetricSet,
    pub diff: MetricDelta,
}

/// Ranking output unit for a single metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub domain: String,
    pub baseline_value: f64,
    pub candidate_value: f64,
    pub delta: f64,
}
