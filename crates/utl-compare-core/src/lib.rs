//! # utl-compare Core
//!
//! Baseline vs Framework metric comparison pipeline.
//!
//! ## Overview
//!
//! - **Feed acquisition** over an ordered source list with per-source retry,
//!   deadlines, and a static fallback dataset
//! - **Row normalization** from untyped CSV records into validated domain types
//! - **Diff and ranking** of per-domain deltas by absolute magnitude
//! - **Sliding-window rate limiting** over a shared counter store
//! - **Summaries** from the Anthropic messages API, with fixed fallback text
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`compare`] | Request orchestration and response shapes |
//! | [`config`] | Environment-driven configuration and wiring |
//! | [`counter_store`] | Counter store trait, in-memory and `DuckDB` stores |
//! | [`diff`] | Deltas, ranking, `topN` coercion |
//! | [`domain`] | Metric and comparison types |
//! | [`error`] | Core error types |
//! | [`fallback`] | Static fallback dataset |
//! | [`feed`] | Resilient feed fetcher |
//! | [`health`] | Dependency health probe |
//! | [`http_client`] | HTTP client abstraction |
//! | [`normalize`] | Raw row validation and normalization |
//! | [`rate_limit`] | Sliding-window limiter |
//! | [`retry`] | Per-source retry policy |
//! | [`summary`] | Summary generation |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │ CompareService  │────▶│ SlidingWindow    │───▶ CounterStore
//! └────────┬────────┘     │ Limiter          │     (memory / DuckDB)
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ FeedFetcher     │────▶│ HTTP Client      │
//! │ (retry/fallback)│     │ (reqwest/script) │
//! └────────┬────────┘     └──────────────────┘
//!          │ normalize
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ diff / rank     │────▶│ SummaryGenerator │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use utl_compare_core::{CompareConfig, CompareQuery, InMemoryCounterStore, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = CompareConfig::from_env().service(
//!         Arc::new(ReqwestHttpClient::new()),
//!         Arc::new(InMemoryCounterStore::new()),
//!     );
//!
//!     match service.compare("127.0.0.1", &CompareQuery::default()).await {
//!         Ok(response) => println!("{} domains", response.domains_count()),
//!         Err(rejection) => eprintln!("{}: {}", rejection.status_code(), rejection.message()),
//!     }
//! }
//! ```

pub mod compare;
pub mod config;
pub mod counter_store;
pub mod diff;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod feed;
pub mod health;
pub mod http_client;
pub mod normalize;
pub mod rate_limit;
pub mod retry;
pub mod summary;

// Orchestration
pub use compare::{CompareQuery, CompareRejection, CompareResponse, CompareService, RejectionBody};
pub use config::CompareConfig;

// Counter stores
pub use counter_store::{CounterStore, DuckDbCounterStore, InMemoryCounterStore, StoreError};

// Diff and ranking
pub use diff::{diff, parse_top_n, rank, DEFAULT_TOP_N};

// Domain models
pub use domain::{DiffRecord, DomainComparison, Metric, MetricDelta, MetricSet, RankedEntry, UtcDateTime};

// Error types
pub use error::ValidationError;

// Feed acquisition
pub use fallback::{fallback_dataset, FALLBACK_DOMAIN};
pub use feed::{
    AttemptFailure, AttemptRecord, FeedFetcher, FeedOrigin, FetchOutcome, Liveness,
    PUBLIC_MIRROR_URL,
};
pub use retry::{Backoff, FetchPolicy};

// Health
pub use health::{ComponentHealth, ComponentStatus, HealthProbe, HealthReport};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, OfflineHttpClient,
    ReqwestHttpClient, ScriptedHttpClient, ScriptedReply,
};

// Rate limiting
pub use rate_limit::{RateLimitDecision, RateLimitKey, RateLimitPolicy, SlidingWindowLimiter};

// Summaries
pub use summary::{
    fallback_summary, AnthropicSummaryClient, SummaryError, SummaryGenerator, Verbosity,
};

// Warehouse (re-exported from utl-compare-warehouse)
pub use utl_compare_warehouse::{CounterWarehouse, WarehouseConfig, WarehouseError};
