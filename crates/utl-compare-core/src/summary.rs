//! Natural-language summaries of a ranking.
//!
//! [`AnthropicSummaryClient`] calls the messages API over the shared
//! [`HttpClient`]. Callers are expected to substitute [`fallback_summary`]
//! whenever a [`SummaryGenerator`] fails; ranking output never depends on it.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{Metric, RankedEntry, ValidationError};

pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_SUMMARY_MODEL: &str = "claude-3-haiku-20240307";
const MAX_TOKENS: u32 = 512;
// Prompts list at most this many entries.
const PROMPT_ENTRY_LIMIT: usize = 12;

/// Requested summary length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Brief,
    Full,
}

impl Verbosity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Full => "full",
        }
    }

    /// Reads the `sum` request parameter: missing or blank means no summary.
    pub fn from_param(raw: Option<&str>) -> Result<Option<Self>, ValidationError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => value.parse().map(Some),
        }
    }
}

impl Display for Verbosity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "brief" => Ok(Self::Brief),
            "full" => Ok(Self::Full),
            other => Err(ValidationError::UnknownSummaryMode {
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SummaryError {
    #[error("summary API key is not configured")]
    MissingApiKey,
    #[error("summary request failed: {0}")]
    Transport(String),
    #[error("summary API returned HTTP {status}")]
    Status { status: u16 },
    #[error("summary response could not be parsed: {0}")]
    Parse(String),
    #[error("summary response contained no text")]
    Empty,
    #[error("summary timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

pub type SummaryFuture<'a> = Pin<Box<dyn Future<Output = Result<String, SummaryError>> + Send + 'a>>;

/// Produces prose for a ranked list.
pub trait SummaryGenerator: Send + Sync {
    fn summarize<'a>(
        &'a self,
        metric: Metric,
        entries: &'a [RankedEntry],
        verbosity: Verbosity,
    ) -> SummaryFuture<'a>;
}

/// Fixed text used when no generated summary is available.
pub fn fallback_summary(metric: Metric, verbosity: Verbosity) -> String {
    match verbosity {
        Verbosity::Brief => format!(
            "UTL Framework vs Span Baseline on {}: automated summary unavailable, see the ranked domains.",
            metric.label()
        ),
        Verbosity::Full => format!(
            "An automated summary could not be generated. The table ranks domains by the absolute \
             change in {} between Span Baseline and UTL Framework; {} values are better. \
             Refer to the per-domain deltas for details.",
            metric.label(),
            if metric.lower_is_better() { "lower" } else { "higher" }
        ),
    }
}

/// Prompt text sent to the model.
pub fn build_prompt(metric: Metric, entries: &[RankedEntry], verbosity: Verbosity) -> String {
    let direction = if metric.lower_is_better() {
        "lower is better"
    } else {
        "higher is better"
    };
    let mut prompt = format!(
        "Compare Span Baseline and UTL Framework on {} ({direction}).\n",
        metric.label()
    );

    if entries.is_empty() {
        prompt.push_str("No domains are available.\n");
    } else {
        prompt.push_str("Domains ranked by absolute change:\n");
        for entry in entries.iter().take(PROMPT_ENTRY_LIMIT) {
            prompt.push_str(&format!(
                "- {}: baseline {}, framework {}, delta {:+}\n",
                entry.domain, entry.baseline_value, entry.candidate_value, entry.delta
            ));
        }
    }

    prompt.push_str(match verbosity {
        Verbosity::Brief => "Summarize the result in at most 2 sentences.",
        Verbosity::Full => "Summarize the result in one paragraph, naming the largest changes.",
    });
    prompt
}

/// Messages API client.
#[derive(Clone)]
pub struct AnthropicSummaryClient {
    http_client: Arc<dyn HttpClient>,
    api_key: Option<String>,
    model: String,
    endpoint: String,
    timeout: Duration,
}

impl AnthropicSummaryClient {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        Self {
            http_client,
            api_key: api_key
                .map(|key| key.trim().to_owned())
                .filter(|key| !key.is_empty()),
            model: String::from(DEFAULT_SUMMARY_MODEL),
            endpoint: String::from(ANTHROPIC_MESSAGES_URL),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn request(&self, prompt: String) -> Result<String, SummaryError> {
        let api_key = self.api_key.as_deref().ok_or(SummaryError::MissingApiKey)?;
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let request = HttpRequest::post(&self.endpoint)
            .with_auth(&HttpAuth::Header {
                name: String::from("x-api-key"),
                value: api_key.to_owned(),
            })
            .with_header("anthropic-version", ANTHROPIC_VERSION)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .with_timeout(self.timeout);

        let response = self.http_client.execute(request).await.map_err(|error| {
            if error.timed_out() {
                SummaryError::Timeout {
                    timeout_ms: self.timeout.as_millis().min(u128::from(u64::MAX)) as u64,
                }
            } else {
                SummaryError::Transport(error.message().to_owned())
            }
        })?;

        if !response.is_success() {
            return Err(SummaryError::Status {
                status: response.status,
            });
        }

        first_text_block(&response.body)
    }
}

impl SummaryGenerator for AnthropicSummaryClient {
    fn summarize<'a>(
        &'a self,
        metric: Metric,
        entries: &'a [RankedEntry],
        verbosity: Verbosity,
    ) -> SummaryFuture<'a> {
        Box::pin(async move { self.request(build_prompt(metric, entries, verbosity)).await })
    }
}

fn first_text_block(body: &str) -> Result<String, SummaryError> {
    let value: Value =
        serde_json::from_str(body).map_err(|error| SummaryError::Parse(error.to_string()))?;
    let first = value
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.first())
        .ok_or(SummaryError::Empty)?;

    if first.get("type").and_then(Value::as_str) != Some("text") {
        return Err(SummaryError::Empty);
    }

    let text = first
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if text.is_empty() {
        return Err(SummaryError::Empty);
    }
    Ok(text.to_owned())
}
