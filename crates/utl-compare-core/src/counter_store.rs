//! Shared counter store behind the sliding-window rate limiter.
//!
//! The limiter needs only three primitives. Each is atomic on its own; the
//! sequence of calls the limiter makes is not.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use utl_compare_warehouse::{CounterWarehouse, WarehouseError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
    #[error("counter store backend error: {0}")]
    Backend(String),
}

impl From<WarehouseError> for StoreError {
    fn from(error: WarehouseError) -> Self {
        Self::Backend(error.to_string())
    }
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Per-key, score-ordered set of members.
pub trait CounterStore: Send + Sync {
    /// Number of members under `key` with `min <= score <= max`.
    fn count_in_range<'a>(&'a self, key: &'a str, min: i64, max: i64) -> StoreFuture<'a, u64>;

    fn insert<'a>(&'a self, key: &'a str, score: i64, member: &'a str) -> StoreFuture<'a, ()>;

    /// Removes members under `key` with `score < threshold`.
    fn prune_below<'a>(&'a self, key: &'a str, threshold: i64) -> StoreFuture<'a, u64>;
}

/// Process-local store; state is lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterStore {
    entries: Arc<Mutex<HashMap<String, BTreeSet<(i64, String)>>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total members held under `key`, pruned or not.
    pub async fn len(&self, key: &str) -> usize {
        self.entries
            .lock()
            .await
            .get(key)
            .map_or(0, BTreeSet::len)
    }
}

impl CounterStore for InMemoryCounterStore {
    fn count_in_range<'a>(&'a self, key: &'a str, min: i64, max: i64) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            if min > max {
                return Ok(0);
            }
            let entries = self.entries.lock().await;
            let count = entries.get(key).map_or(0, |members| {
                members
                    .range((min, String::new())..)
                    .take_while(|(score, _)| *score <= max)
                    .count()
            });
            Ok(count as u64)
        })
    }

    fn insert<'a>(&'a self, key: &'a str, score: i64, member: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let members = entries.entry(key.to_owned()).or_default();
            // A member appears at most once, whatever its score.
            if !members.iter().any(|(_, existing)| existing == member) {
                members.insert((score, member.to_owned()));
            }
            Ok(())
        })
    }

    fn prune_below<'a>(&'a self, key: &'a str, threshold: i64) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let Some(members) = entries.get_mut(key) else {
                return Ok(0);
            };
            let kept = members.split_off(&(threshold, String::new()));
            let removed = members.len() as u64;
            *members = kept;
            if members.is_empty() {
                entries.remove(key);
            }
            Ok(removed)
        })
    }
}

/// [`CounterStore`] over the `DuckDB` warehouse, shared across processes
/// through its database file.
#[derive(Clone)]
pub struct DuckDbCounterStore {
    warehouse: CounterWarehouse,
}

impl DuckDbCounterStore {
    pub fn new(warehouse: CounterWarehouse) -> Self {
        Self { warehouse }
    }

    pub fn warehouse(&self) -> &CounterWarehouse {
        &self.warehouse
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(CounterWarehouse) -> Result<T, WarehouseError> + Send + 'static,
    {
        let warehouse = self.warehouse.clone();
        tokio::task::spawn_blocking(move || call(warehouse))
            .await
            .map_err(|error| StoreError::Backend(format!("store task failed: {error}")))?
            .map_err(StoreError::from)
    }
}

impl CounterStore for DuckDbCounterStore {
    fn count_in_range<'a>(&'a self, key: &'a str, min: i64, max: i64) -> StoreFuture<'a, u64> {
        let key = key.to_owned();
        Box::pin(self.blocking(move |warehouse| warehouse.count_in_range(&key, min, max)))
    }

    fn insert<'a>(&'a self, key: &'a str, score: i64, member: &'a str) -> StoreFuture<'a, ()> {
        let key = key.to_owned();
        let member = member.to_owned();
        Box::pin(self.blocking(move |warehouse| warehouse.insert(&key, score, &member)))
    }

    fn prune_below<'a>(&'a self, key: &'a str, threshold: i64) -> StoreFuture<'a, u64> {
        let key = key.to_owned();
        Box::pin(self.blocking(move |warehouse| warehouse.prune_below(&key, threshold)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_range_is_inclusive_on_both_ends() {
        let store = InMemoryCounterStore::new();
        for (score, member) in [(10, "a"), (20, "b"), (30, "c")] {
            store.insert("k", score, member).await.expect("insert");
        }

        assert_eq!(store.count_in_range("k", 10, 30).await.expect("count"), 3);
        assert_eq!(store.count_in_range("k", 11, 29).await.expect("count"), 1);
        assert_eq!(store.count_in_range("k", 31, 10).await.expect("count"), 0);
        assert_eq!(store.count_in_range("other", 0, 100).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn in_memory_same_score_distinct_members_are_both_kept() {
        let store = InMemoryCounterStore::new();
        store.insert("k", 5, "first").await.expect("insert");
        store.insert("k", 5, "second").await.expect("insert");
        store.insert("k", 6, "second").await.expect("duplicate member");

        assert_eq!(store.len("k").await, 2);
    }

    #[tokio::test]
    async fn in_memory_prune_keeps_threshold_score() {
        let store = InMemoryCounterStore::new();
        for (score, member) in [(99, "old"), (100, "edge"), (101, "new")] {
            store.insert("k", score, member).await.expect("insert");
        }

        assert_eq!(store.prune_below("k", 100).await.expect("prune"), 1);
        assert_eq!(store.len("k").await, 2);
        assert_eq!(store.prune_below("missing", 100).await.expect("prune"), 0);
    }

    #[tokio::test]
    async fn duckdb_store_answers_through_the_trait() {
        let warehouse = CounterWarehouse::open_in_memory().expect("open warehouse");
        let store: Arc<dyn CounterStore> = Arc::new(DuckDbCounterStore::new(warehouse));

        store.insert("k", 1_000, "m1").await.expect("insert");
        store.insert("k", 2_000, "m2").await.expect("insert");

        assert_eq!(store.count_in_range("k", 0, 5_000).await.expect("count"), 2);
        assert_eq!(store.prune_below("k", 1_500).await.expect("prune"), 1);
        assert_eq!(store.count_in_range("k", 0, 5_000).await.expect("count"), 1);
    }
}
