use thiserror::Error;

/// Validation and contract errors exposed by `utl-compare-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("domain cannot be empty")]
    EmptyDomain,

    #[error("field '{field}' must be within [0, 1]")]
    FractionOutOfRange { field: &'static str },
    #[error("field '{field}' must be a positive integer")]
    NonPositiveLatency { field: &'static str },
    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },

    #[error(
        "Unknown metric '{value}'. Allowed: f1_score, latency_ms, false_positive_rate, efficiency"
    )]
    UnknownMetric { value: String },
    #[error("Unknown summary mode '{value}'. Allowed: brief, full")]
    UnknownSummaryMode { value: String },
    #[error("Invalid query string: {detail}")]
    MalformedQuery { detail: String },
}
