//! Runtime configuration.
//!
//! Values are read from `UTL_COMPARE_*` variables, with the unprefixed
//! deployment names as fallback where one exists:
//!
//! | Field | Variable | Fallback | Default |
//! |-------|----------|----------|---------|
//! | `feed_url` | `UTL_COMPARE_CSV_URL` | `CSV_PUBLIC_URL` | none |
//! | `api_key` | `UTL_COMPARE_ANTHROPIC_API_KEY` | `ANTHROPIC_API_KEY` | none |
//! | `summary_model` | `UTL_COMPARE_SUMMARY_MODEL` | | `claude-3-haiku-20240307` |
//! | `rate_limit.max_requests` | `UTL_COMPARE_RATE_LIMIT_MAX` | | `10` |
//! | `rate_limit.window_ms` | `UTL_COMPARE_RATE_LIMIT_WINDOW_MS` | | `60000` |
//! | `counter_db` | `UTL_COMPARE_COUNTER_DB` | | `$UTL_COMPARE_HOME/counters.duckdb` |
//! | `listen_addr` | `UTL_COMPARE_LISTEN_ADDR` | | `127.0.0.1:8080` |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::compare::CompareService;
use crate::counter_store::CounterStore;
use crate::feed::FeedFetcher;
use crate::health::HealthProbe;
use crate::http_client::HttpClient;
use crate::rate_limit::{RateLimitPolicy, SlidingWindowLimiter};
use crate::summary::{AnthropicSummaryClient, DEFAULT_SUMMARY_MODEL};
use crate::FetchPolicy;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareConfig {
    pub feed_url: Option<String>,
    pub api_key: Option<String>,
    pub summary_model: String,
    pub summary_timeout: Duration,
    pub fetch: FetchPolicy,
    pub rate_limit: RateLimitPolicy,
    /// `None` uses the warehouse default location.
    pub counter_db: Option<PathBuf>,
    pub listen_addr: String,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            feed_url: None,
            api_key: None,
            summary_model: String::from(DEFAULT_SUMMARY_MODEL),
            summary_timeout: Duration::from_secs(10),
            fetch: FetchPolicy::default(),
            rate_limit: RateLimitPolicy::default(),
            counter_db: None,
            listen_addr: String::from(DEFAULT_LISTEN_ADDR),
        }
    }
}

impl CompareConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            feed_url: non_empty_var("UTL_COMPARE_CSV_URL")
                .or_else(|| non_empty_var("CSV_PUBLIC_URL")),
            api_key: non_empty_var("UTL_COMPARE_ANTHROPIC_API_KEY")
                .or_else(|| non_empty_var("ANTHROPIC_API_KEY")),
            summary_model: non_empty_var("UTL_COMPARE_SUMMARY_MODEL")
                .unwrap_or(defaults.summary_model),
            rate_limit: RateLimitPolicy {
                max_requests: parsed_var(
                    "UTL_COMPARE_RATE_LIMIT_MAX",
                    defaults.rate_limit.max_requests,
                ),
                window_ms: parsed_var(
                    "UTL_COMPARE_RATE_LIMIT_WINDOW_MS",
                    defaults.rate_limit.window_ms,
                ),
                ..defaults.rate_limit
            },
            counter_db: non_empty_var("UTL_COMPARE_COUNTER_DB").map(PathBuf::from),
            listen_addr: non_empty_var("UTL_COMPARE_LISTEN_ADDR")
                .unwrap_or(defaults.listen_addr),
            ..defaults
        }
    }

    pub fn with_feed_url(mut self, feed_url: impl Into<String>) -> Self {
        self.feed_url = Some(feed_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch = self.fetch.with_timeout(timeout);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitPolicy) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_counter_db(mut self, counter_db: impl Into<PathBuf>) -> Self {
        self.counter_db = Some(counter_db.into());
        self
    }

    pub fn fetcher(&self, http_client: Arc<dyn HttpClient>) -> FeedFetcher {
        FeedFetcher::new(http_client, self.feed_url.as_deref(), self.fetch.clone())
    }

    pub fn summarizer(&self, http_client: Arc<dyn HttpClient>) -> AnthropicSummaryClient {
        AnthropicSummaryClient::new(http_client, self.api_key.clone())
            .with_model(self.summary_model.clone())
            .with_timeout(self.summary_timeout)
    }

    /// Wires the full pipeline over one transport and one counter store.
    pub fn service(
        &self,
        http_client: Arc<dyn HttpClient>,
        store: Arc<dyn CounterStore>,
    ) -> CompareService {
        CompareService::new(
            self.fetcher(Arc::clone(&http_client)),
            SlidingWindowLimiter::new(store, self.rate_limit),
            Arc::new(self.summarizer(http_client)),
        )
        .with_summary_timeout(self.summary_timeout)
    }

    pub fn health_probe(&self, http_client: Arc<dyn HttpClient>) -> HealthProbe {
        HealthProbe::new(
            self.fetcher(Arc::clone(&http_client)),
            Arc::new(self.summarizer(http_client)),
            self.summary_timeout,
        )
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match non_empty_var(name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, %default, "ignoring unparseable setting");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter_store::InMemoryCounterStore;
    use crate::feed::PUBLIC_MIRROR_URL;
    use crate::http_client::OfflineHttpClient;

    #[test]
    fn defaults_match_documented_values() {
        let config = CompareConfig::default();

        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.summary_model, "claude-3-haiku-20240307");
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
    }

    #[test]
    fn fetcher_puts_configured_url_first() {
        let config = CompareConfig::default().with_feed_url("https://sheet.test/export.csv");

        let fetcher = config.fetcher(Arc::new(OfflineHttpClient));

        assert_eq!(
            fetcher.sources(),
            &["https://sheet.test/export.csv".to_owned(), PUBLIC_MIRROR_URL.to_owned()]
        );
    }

    #[test]
    fn summarizer_without_key_reports_missing_key() {
        let config = CompareConfig::default();
        assert!(!config.summarizer(Arc::new(OfflineHttpClient)).has_api_key());
        assert!(config
            .with_api_key("sk-test")
            .summarizer(Arc::new(OfflineHttpClient))
            .has_api_key());
    }

    #[test]
    fn service_carries_summary_timeout() {
        let config = CompareConfig {
            summary_timeout: Duration::from_millis(250),
            ..CompareConfig::default()
        };

        let service = config.service(
            Arc::new(OfflineHttpClient),
            Arc::new(InMemoryCounterStore::new()),
        );

        assert_eq!(service.summary_timeout(), Duration::from_millis(250));
    }
}
