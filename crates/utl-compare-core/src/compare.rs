//! Request orchestration: limiter, then fetch, ranking, and optional summary.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::diff::{diff, parse_top_n, rank};
use crate::feed::{FeedFetcher, Liveness};
use crate::rate_limit::{RateLimitDecision, RateLimitKey, SlidingWindowLimiter};
use crate::summary::{fallback_summary, SummaryGenerator, Verbosity};
use crate::{Metric, RankedEntry, UtcDateTime, ValidationError};

pub const DEFAULT_BASELINE_LABEL: &str = "Span Baseline";
pub const DEFAULT_CANDIDATE_LABEL: &str = "UTL Framework";

/// Raw request parameters, exactly as the caller supplied them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompareQuery {
    pub metric: Option<String>,
    #[serde(rename = "topN")]
    pub top_n: Option<String>,
    pub sum: Option<String>,
    pub file1: Option<String>,
    pub file2: Option<String>,
}

impl CompareQuery {
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self
    }

    pub fn with_top_n(mut self, top_n: impl Into<String>) -> Self {
        self.top_n = Some(top_n.into());
        self
    }

    pub fn with_sum(mut self, sum: impl Into<String>) -> Self {
        self.sum = Some(sum.into());
        self
    }

    /// Metric name used in the rate limit key; not validated.
    pub fn rate_key_metric(&self) -> Option<&str> {
        self.metric.as_deref()
    }

    fn metric(&self) -> Result<Metric, ValidationError> {
        match self.metric.as_deref() {
            None => Ok(Metric::F1Score),
            Some(raw) => raw.parse(),
        }
    }

    fn labels(&self) -> [String; 2] {
        let label = |raw: &Option<String>, default: &str| {
            raw.as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
                .to_owned()
        };
        [
            label(&self.file1, DEFAULT_BASELINE_LABEL),
            label(&self.file2, DEFAULT_CANDIDATE_LABEL),
        ]
    }
}

/// Successful comparison payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResponse {
    pub ok: bool,
    pub files: [String; 2],
    pub metric: Metric,
    pub domains: Vec<RankedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub timestamp: UtcDateTime,
    pub data_source: Liveness,
    /// `None` when the counter store was unavailable and the request was
    /// admitted without a check.
    pub remaining: Option<u64>,
}

impl CompareResponse {
    pub fn domains_count(&self) -> usize {
        self.domains.len()
    }
}

/// Why a request was refused before any data work was done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareRejection {
    RateLimited { retry_after_seconds: u64 },
    InvalidParameter(ValidationError),
}

impl CompareRejection {
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::RateLimited { .. } => 429,
            Self::InvalidParameter(_) => 400,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::RateLimited { .. } => String::from("Rate limited"),
            Self::InvalidParameter(error) => error.to_string(),
        }
    }

    pub fn body(&self) -> RejectionBody {
        RejectionBody {
            ok: false,
            error: self.message(),
            retry_after: match self {
                Self::RateLimited {
                    retry_after_seconds,
                } => Some(*retry_after_seconds),
                Self::InvalidParameter(_) => None,
            },
        }
    }
}

impl From<ValidationError> for CompareRejection {
    fn from(error: ValidationError) -> Self {
        Self::InvalidParameter(error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody {
    pub ok: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Composes the pipeline for one request at a time; cheap to clone and share.
#[derive(Clone)]
pub struct CompareService {
    fetcher: FeedFetcher,
    limiter: SlidingWindowLimiter,
    summarizer: Arc<dyn SummaryGenerator>,
    summary_timeout: Duration,
}

impl CompareService {
    pub fn new(
        fetcher: FeedFetcher,
        limiter: SlidingWindowLimiter,
        summarizer: Arc<dyn SummaryGenerator>,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            summarizer,
            summary_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_summary_timeout(mut self, summary_timeout: Duration) -> Self {
        self.summary_timeout = summary_timeout;
        self
    }

    pub fn fetcher(&self) -> &FeedFetcher {
        &self.fetcher
    }

    pub fn summarizer(&self) -> Arc<dyn SummaryGenerator> {
        Arc::clone(&self.summarizer)
    }

    pub fn summary_timeout(&self) -> Duration {
        self.summary_timeout
    }

    /// Runs one comparison for `client`.
    ///
    /// The rate check happens first, so a malformed request still spends
    /// quota. A limited request does no fetch and no summary.
    pub async fn compare(
        &self,
        client: &str,
        query: &CompareQuery,
    ) -> Result<CompareResponse, CompareRejection> {
        let key = RateLimitKey::new(client, query.rate_key_metric());
        let decision = self.admit(&key).await?;

        let metric = query.metric()?;
        let verbosity = Verbosity::from_param(query.sum.as_deref())?;
        let top_n = parse_top_n(query.top_n.as_deref());

        let outcome = self.fetcher.fetch_with_report().await;
        let domains = rank(&diff(&outcome.comparisons), metric, top_n);

        let summary = match verbosity {
            Some(verbosity) => Some(self.summarize(metric, &domains, verbosity).await),
            None => None,
        };

        info!(
            key = %key,
            metric = %metric,
            domains = domains.len(),
            data_source = %outcome.liveness(),
            fetch_latency_ms = outcome.latency_ms,
            "comparison served"
        );

        Ok(CompareResponse {
            ok: true,
            files: query.labels(),
            metric,
            domains,
            summary,
            timestamp: UtcDateTime::now(),
            data_source: outcome.liveness(),
            remaining: decision.map(|decision| decision.remaining),
        })
    }

    /// Answer for a request whose query string could not be decoded.
    ///
    /// Quota is spent under the `all` metric key, like any other request, so
    /// a throttled client still sees `RateLimited` first.
    pub async fn reject_malformed_query(
        &self,
        client: &str,
        detail: impl Into<String>,
    ) -> CompareRejection {
        let key = RateLimitKey::new(client, None);
        match self.admit(&key).await {
            Err(rejection) => rejection,
            Ok(_) => CompareRejection::InvalidParameter(ValidationError::MalformedQuery {
                detail: detail.into(),
            }),
        }
    }

    async fn admit(&self, key: &RateLimitKey) -> Result<Option<RateLimitDecision>, CompareRejection> {
        match self.limiter.check(key).await {
            Ok(decision) if decision.limited => Err(CompareRejection::RateLimited {
                retry_after_seconds: decision.retry_after_seconds,
            }),
            Ok(decision) => Ok(Some(decision)),
            Err(error) => {
                warn!(key = %key, %error, "rate limit store unavailable; admitting request");
                Ok(None)
            }
        }
    }

    async fn summarize(
        &self,
        metric: Metric,
        domains: &[RankedEntry],
        verbosity: Verbosity,
    ) -> String {
        let call = self.summarizer.summarize(metric, domains, verbosity);
        let failure = match tokio::time::timeout(self.summary_timeout, call).await {
            Ok(Ok(summary)) => return summary,
            Ok(Err(error)) => error.to_string(),
            Err(_) => format!(
                "summary timed out after {}ms",
                self.summary_timeout.as_millis()
            ),
        };
        warn!(metric = %metric, %verbosity, error = %failure, "using fallback summary");
        fallback_summary(metric, verbosity)
    }
}
