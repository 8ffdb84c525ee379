//! Sliding-window request limiter.
//!
//! Every accepted request leaves one `(now_ms, token)` entry under its key.
//! A check counts the entries inside `[now - window, now]`; at or above the
//! limit the request is refused and nothing is written.
//!
//! The count, insert, and prune calls are three separate store operations.
//! Two concurrent checks for the same key can both observe `max - 1` entries
//! and both be admitted, so the limit may be exceeded briefly under load.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::counter_store::{CounterStore, StoreError};
use crate::UtcDateTime;

/// Limit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u64,
    pub window_ms: u64,
    /// Deadline applied to each individual store call.
    pub store_timeout: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 60_000,
            store_timeout: Duration::from_millis(1_000),
        }
    }
}

impl RateLimitPolicy {
    pub fn new(max_requests: u64, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
            ..Self::default()
        }
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }
}

/// Identity a window is kept for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub client: String,
    pub metric: String,
}

impl RateLimitKey {
    /// Blank parts fall back to `unknown` and `all`.
    pub fn new(client: impl AsRef<str>, metric: Option<&str>) -> Self {
        let client = client.as_ref().trim();
        let metric = metric.map(str::trim).filter(|value| !value.is_empty());
        Self {
            client: if client.is_empty() {
                String::from("unknown")
            } else {
                client.to_owned()
            },
            metric: metric.unwrap_or("all").to_owned(),
        }
    }
}

impl Display for RateLimitKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "rate:{}:{}", self.client, self.metric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub limited: bool,
    pub remaining: u64,
    pub retry_after_seconds: u64,
}

#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn CounterStore>,
    policy: RateLimitPolicy,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub async fn check(&self, key: &RateLimitKey) -> Result<RateLimitDecision, StoreError> {
        self.check_at(key, UtcDateTime::now().unix_millis()).await
    }

    /// Same as [`Self::check`] with an explicit clock reading in Unix ms.
    pub async fn check_at(
        &self,
        key: &RateLimitKey,
        now_ms: i64,
    ) -> Result<RateLimitDecision, StoreError> {
        let key = key.to_string();
        let window_ms = i64::try_from(self.policy.window_ms).unwrap_or(i64::MAX);
        let window_start = now_ms.saturating_sub(window_ms);

        let count = self
            .bounded(
                "count_in_range",
                self.store.count_in_range(&key, window_start, now_ms),
            )
            .await?;

        if count >= self.policy.max_requests {
            let retry_after_seconds = retry_after_seconds(now_ms, self.policy.window_ms);
            debug!(key = %key, count, retry_after_seconds, "rate limited");
            return Ok(RateLimitDecision {
                limited: true,
                remaining: 0,
                retry_after_seconds,
            });
        }

        let token = Uuid::new_v4().to_string();
        self.bounded("insert", self.store.insert(&key, now_ms, &token))
            .await?;
        let pruned = self
            .bounded("prune_below", self.store.prune_below(&key, window_start))
            .await?;
        debug!(key = %key, count, pruned, "request admitted");

        Ok(RateLimitDecision {
            limited: false,
            remaining: self.policy.max_requests.saturating_sub(count + 1),
            retry_after_seconds: 0,
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let timeout = self.policy.store_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| StoreError::Timeout {
                operation,
                timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            })?
    }
}

/// Seconds until the next fixed window boundary, rounded up.
///
/// Measured against fixed `window_ms` boundaries rather than the oldest
/// entry, so the hint can be shorter than the true wait.
pub fn retry_after_seconds(now_ms: i64, window_ms: u64) -> u64 {
    if window_ms == 0 {
        return 0;
    }
    let window = i128::from(window_ms);
    let until_boundary = window - i128::from(now_ms).rem_euclid(window);
    let seconds = (until_boundary + 999) / 1_000;
    seconds.clamp(0, i128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter_store::{InMemoryCounterStore, StoreFuture};

    /// Store whose range count never resolves.
    struct StalledStore;

    impl CounterStore for StalledStore {
        fn count_in_range<'a>(&'a self, _key: &'a str, _min: i64, _max: i64) -> StoreFuture<'a, u64> {
            Box::pin(std::future::pending())
        }

        fn insert<'a>(&'a self, _key: &'a str, _score: i64, _member: &'a str) -> StoreFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn prune_below<'a>(&'a self, _key: &'a str, _threshold: i64) -> StoreFuture<'a, u64> {
            Box::pin(async { Ok(0) })
        }
    }

    #[test]
    fn key_renders_client_and_metric() {
        assert_eq!(
            RateLimitKey::new("10.0.0.1", Some("f1_score")).to_string(),
            "rate:10.0.0.1:f1_score"
        );
        assert_eq!(RateLimitKey::new("  ", None).to_string(), "rate:unknown:all");
        assert_eq!(RateLimitKey::new("c", Some("")).to_string(), "rate:c:all");
    }

    #[test]
    fn retry_hint_rounds_up_to_the_window_boundary() {
        assert_eq!(retry_after_seconds(0, 60_000), 60);
        assert_eq!(retry_after_seconds(59_001, 60_000), 1);
        assert_eq!(retry_after_seconds(59_999, 60_000), 1);
        assert_eq!(retry_after_seconds(61_500, 60_000), 59);
        assert_eq!(retry_after_seconds(1_000, 0), 0);
    }

    #[tokio::test]
    async fn remaining_counts_down_then_limits() {
        let limiter = SlidingWindowLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            RateLimitPolicy::new(3, 60_000),
        );
        let key = RateLimitKey::new("client", Some("f1_score"));

        let mut remaining = Vec::new();
        for offset in 0..3 {
            let decision = limiter.check_at(&key, 1_000 + offset).await.expect("store");
            assert!(!decision.limited);
            remaining.push(decision.remaining);
        }
        let refused = limiter.check_at(&key, 1_010).await.expect("store");

        assert_eq!(remaining, vec![2, 1, 0]);
        assert!(refused.limited);
        assert_eq!(refused.remaining, 0);
        assert_eq!(refused.retry_after_seconds, 59);
    }

    #[tokio::test]
    async fn refused_checks_are_not_recorded() {
        let store = InMemoryCounterStore::new();
        let limiter =
            SlidingWindowLimiter::new(Arc::new(store.clone()), RateLimitPolicy::new(1, 1_000));
        let key = RateLimitKey::new("client", None);

        limiter.check_at(&key, 10).await.expect("store");
        limiter.check_at(&key, 20).await.expect("store");
        limiter.check_at(&key, 30).await.expect("store");

        assert_eq!(store.len(&key.to_string()).await, 1);
    }

    #[tokio::test]
    async fn keys_are_limited_independently() {
        let limiter = SlidingWindowLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            RateLimitPolicy::new(1, 60_000),
        );

        let first = limiter
            .check_at(&RateLimitKey::new("a", Some("f1_score")), 100)
            .await
            .expect("store");
        let other_metric = limiter
            .check_at(&RateLimitKey::new("a", Some("latency_ms")), 100)
            .await
            .expect("store");

        assert!(!first.limited);
        assert!(!other_metric.limited);
    }

    #[tokio::test]
    async fn stalled_store_call_times_out() {
        let limiter = SlidingWindowLimiter::new(
            Arc::new(StalledStore),
            RateLimitPolicy::default().with_store_timeout(Duration::from_millis(20)),
        );

        let error = limiter
            .check_at(&RateLimitKey::new("client", None), 1_000)
            .await
            .expect_err("deadline");

        assert!(matches!(
            error,
            StoreError::Timeout {
                operation: "count_in_range",
                timeout_ms: 20,
            }
        ));
    }
}
