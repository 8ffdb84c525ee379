//! Resilient feed fetcher.
//!
//! Walks an ordered source list (configured primary, then the public mirror),
//! giving each source a bounded number of timed tries with linear backoff.
//! The first source that yields at least one valid row wins. When every
//! source is exhausted the static [`fallback_dataset`] is returned, so
//! [`FeedFetcher::fetch`] has no failure mode.
//!
//! Each try produces an explicit outcome: the normalized rows, or an
//! [`AttemptFailure`] describing why the try was discarded.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fallback::fallback_dataset;
use crate::http_client::{HttpClient, HttpRequest};
use crate::normalize::{normalize, RawRow};
use crate::retry::FetchPolicy;
use crate::{DomainComparison, UtcDateTime};

/// Public mirror tried after the configured primary source.
pub const PUBLIC_MIRROR_URL: &str =
    "https://raw.githubusercontent.com/bsabljic/utl-data/main/utl-metrics.csv";

/// Why a single try against a source was discarded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request exceeded {timeout_ms}ms deadline")]
    Timeout { timeout_ms: u64 },
    #[error("HTTP {status}")]
    Status { status: u16 },
    #[error("CSV too small ({bytes} bytes, need at least {min})")]
    PayloadTooSmall { bytes: usize, min: usize },
    #[error("malformed CSV: {0}")]
    Malformed(String),
    #[error("no rows with a domain")]
    NoRows,
    #[error("no valid rows ({rejected} rejected)")]
    NoValidRows { rejected: usize },
}

impl AttemptFailure {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "feed.transport",
            Self::Timeout { .. } => "feed.timeout",
            Self::Status { .. } => "feed.bad_status",
            Self::PayloadTooSmall { .. } => "feed.payload_too_small",
            Self::Malformed(_) => "feed.malformed",
            Self::NoRows => "feed.no_rows",
            Self::NoValidRows { .. } => "feed.no_valid_rows",
        }
    }
}

/// A failed try, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub source: String,
    /// 1-based try index within the source.
    pub attempt: u32,
    pub failure: AttemptFailure,
}

impl Display for AttemptRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} attempt {}: {} ({})",
            self.source,
            self.attempt,
            self.failure,
            self.failure.code()
        )
    }
}

/// Where the returned comparisons came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOrigin {
    Live { source: String },
    Fallback,
}

/// Liveness indicator exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Live,
    Fallback,
}

impl Liveness {
    /// Live when the first comparison carries an upstream timestamp.
    pub fn of(comparisons: &[DomainComparison]) -> Self {
        match comparisons.first() {
            Some(first) if first.has_upstream_timestamp() => Self::Live,
            _ => Self::Fallback,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Fallback => "fallback",
        }
    }
}

impl Display for Liveness {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a full fetch run.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub comparisons: Vec<DomainComparison>,
    pub origin: FeedOrigin,
    pub failures: Vec<AttemptRecord>,
    /// When this snapshot was taken; the only timestamp fallback data has.
    pub fetched_at: UtcDateTime,
    pub latency_ms: u64,
}

impl FetchOutcome {
    pub fn liveness(&self) -> Liveness {
        Liveness::of(&self.comparisons)
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = self
            .failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        if self.origin == FeedOrigin::Fallback {
            warnings.push(String::from(
                "all feed sources exhausted; serving fallback dataset",
            ));
        }
        warnings
    }
}

/// Fetches, validates, and normalizes the comparison feed.
#[derive(Clone)]
pub struct FeedFetcher {
    http_client: Arc<dyn HttpClient>,
    sources: Vec<String>,
    policy: FetchPolicy,
}

impl FeedFetcher {
    /// Builds a fetcher over `primary_url` (when set) followed by the public
    /// mirror.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        primary_url: Option<&str>,
        policy: FetchPolicy,
    ) -> Self {
        let mut sources = Vec::with_capacity(2);
        if let Some(primary) = primary_url.map(str::trim).filter(|url| !url.is_empty()) {
            sources.push(primary.to_owned());
        }
        sources.push(String::from(PUBLIC_MIRROR_URL));
        Self::with_sources(http_client, sources, policy)
    }

    /// Builds a fetcher over an explicit source list, in order.
    pub fn with_sources(
        http_client: Arc<dyn HttpClient>,
        sources: Vec<String>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            http_client,
            sources: dedupe_sources(sources),
            policy,
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Returns live comparisons, or the fallback dataset.
    pub async fn fetch(&self) -> Vec<DomainComparison> {
        self.fetch_with_report().await.comparisons
    }

    pub async fn fetch_with_report(&self) -> FetchOutcome {
        let started = Instant::now();
        let mut failures = Vec::new();

        for source in &self.sources {
            for attempt in 1..=self.policy.tries_per_source() {
                match self.try_source(source).await {
                    Ok(comparisons) => {
                        info!(
                            source = %source,
                            attempt,
                            rows = comparisons.len(),
                            "feed fetched"
                        );
                        return FetchOutcome {
                            comparisons,
                            origin: FeedOrigin::Live {
                                source: source.clone(),
                            },
                            failures,
                            fetched_at: UtcDateTime::now(),
                            latency_ms: elapsed_ms(started),
                        };
                    }
                    Err(failure) => {
                        warn!(
                            source = %source,
                            attempt,
                            code = failure.code(),
                            error = %failure,
                            "feed attempt failed"
                        );
                        failures.push(AttemptRecord {
                            source: source.clone(),
                            attempt,
                            failure,
                        });
                        if let Some(delay) = self.policy.delay_after(attempt) {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        warn!(
            sources = self.sources.len(),
            failed_attempts = failures.len(),
            "all feed sources exhausted; serving fallback dataset"
        );
        FetchOutcome {
            comparisons: fallback_dataset(),
            origin: FeedOrigin::Fallback,
            failures,
            fetched_at: UtcDateTime::now(),
            latency_ms: elapsed_ms(started),
        }
    }

    async fn try_source(&self, url: &str) -> Result<Vec<DomainComparison>, AttemptFailure> {
        let timeout = self.policy.timeout;
        let timeout_ms = timeout.as_millis().min(u128::from(u64::MAX)) as u64;
        let request = HttpRequest::get(url).with_timeout(timeout);

        let response = match tokio::time::timeout(timeout, self.http_client.execute(request)).await
        {
            Err(_) => return Err(AttemptFailure::Timeout { timeout_ms }),
            Ok(Err(error)) if error.timed_out() => {
                return Err(AttemptFailure::Timeout { timeout_ms })
            }
            Ok(Err(error)) => return Err(AttemptFailure::Transport(error.message().to_owned())),
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return Err(AttemptFailure::Status {
                status: response.status,
            });
        }

        if response.body.len() < self.policy.min_payload_bytes {
            return Err(AttemptFailure::PayloadTooSmall {
                bytes: response.body.len(),
                min: self.policy.min_payload_bytes,
            });
        }

        let rows = parse_feed(&response.body)?
            .into_iter()
            .filter(|row| row.domain().is_some())
            .collect::<Vec<_>>();
        if rows.is_empty() {
            return Err(AttemptFailure::NoRows);
        }

        let comparisons = rows
            .iter()
            .filter_map(|row| match normalize(row) {
                Ok(comparison) => Some(comparison),
                Err(error) => {
                    debug!(domain = row.domain().unwrap_or_default(), %error, "row rejected");
                    None
                }
            })
            .collect::<Vec<_>>();
        if comparisons.is_empty() {
            return Err(AttemptFailure::NoValidRows {
                rejected: rows.len(),
            });
        }

        Ok(comparisons)
    }
}

/// Parses a header-first CSV payload into raw rows, skipping blank lines.
///
/// Ragged rows (field count differing from the header) are structural
/// errors and fail the whole payload.
pub fn parse_feed(text: &str) -> Result<Vec<RawRow>, AttemptFailure> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|error| AttemptFailure::Malformed(error.to_string()))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|error| AttemptFailure::Malformed(error.to_string()))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(RawRow::from_pairs(headers.iter().zip(record.iter())));
    }

    Ok(rows)
}

fn dedupe_sources(sources: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| seen.insert(source.clone()))
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
