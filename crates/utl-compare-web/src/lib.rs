//! # utl-compare Web
//!
//! HTTP front end for the comparison pipeline.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /api/compare` | Ranked deltas, query `metric`, `topN`, `sum`, `file1`, `file2` |
//! | `GET /api/health` | Feed and summary API status |
//!
//! Compare responses carry `X-RateLimit-Remaining`, `X-Data-Source`, and
//! `X-Domains-Count`. Throttled requests get `429` with `Retry-After`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utl_compare_core::{
    CompareConfig, CompareQuery, CompareRejection, CompareResponse, CompareService,
    CounterWarehouse, DuckDbCounterStore, HealthProbe, HttpClient, ReqwestHttpClient,
    WarehouseConfig, WarehouseError,
};

pub const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_DATA_SOURCE: HeaderName = HeaderName::from_static("x-data-source");
pub const X_DOMAINS_COUNT: HeaderName = HeaderName::from_static("x-domains-count");

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("invalid listen address '{0}'")]
    ListenAddr(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct AppState {
    pub service: CompareService,
    pub health: HealthProbe,
}

impl AppState {
    pub fn new(service: CompareService, health: HealthProbe) -> Self {
        Self { service, health }
    }

    /// Production wiring: reqwest transport and the `DuckDB` counter store.
    pub fn from_config(config: &CompareConfig) -> Result<Self, ServerError> {
        let warehouse = CounterWarehouse::open(match &config.counter_db {
            Some(path) => WarehouseConfig::at(path),
            None => WarehouseConfig::default(),
        })?;
        let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());

        Ok(Self::new(
            config.service(
                Arc::clone(&http_client),
                Arc::new(DuckDbCounterStore::new(warehouse)),
            ),
            config.health_probe(http_client),
        ))
    }
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/api/compare", get(compare))
        .route("/api/health", get(health))
        .layer(cors)
        .with_state(state)
}

/// First `X-Forwarded-For` hop, or `unknown`.
pub fn client_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("unknown")
        .to_owned()
}

async fn compare(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<CompareQuery>, QueryRejection>,
) -> Response {
    let client = client_identity(&headers);
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            let rejection = state
                .service
                .reject_malformed_query(&client, rejection.body_text())
                .await;
            return rejection_response(&rejection);
        }
    };

    match state.service.compare(&client, &query).await {
        Ok(body) => compare_response(body),
        Err(rejection) => rejection_response(&rejection),
    }
}

fn compare_response(body: CompareResponse) -> Response {
    let cache_control = if body.summary.is_some() {
        "public, s-maxage=5"
    } else {
        "public, s-maxage=60"
    };
    let remaining = body.remaining;
    let data_source = body.data_source.as_str();
    let domains_count = body.domains_count();

    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    headers.insert(X_DATA_SOURCE, HeaderValue::from_static(data_source));
    headers.insert(X_DOMAINS_COUNT, HeaderValue::from(domains_count));
    if let Some(remaining) = remaining {
        headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
    }
    response
}

fn rejection_response(rejection: &CompareRejection) -> Response {
    let status =
        StatusCode::from_u16(rejection.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    let mut response = (status, Json(rejection.body())).into_response();

    if let CompareRejection::RateLimited {
        retry_after_seconds,
    } = rejection
    {
        let headers = response.headers_mut();
        headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_seconds));
        headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(0u64));
    }
    response
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let report = state.health.run().await;
    let status = StatusCode::from_u16(report.status_code()).unwrap_or(StatusCode::OK);
    (status, Json(report)).into_response()
}

pub fn init_tracing() {
    let log_format =
        std::env::var("UTL_COMPARE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn serve(config: CompareConfig) -> Result<(), ServerError> {
    let listen_addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|_| ServerError::ListenAddr(config.listen_addr.clone()))?;
    let state = Arc::new(AppState::from_config(&config)?);

    tracing::info!("Listening on {}", listen_addr);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app_router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_identity_uses_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"),
        );
        assert_eq!(client_identity(&headers), "203.0.113.9");
    }

    #[test]
    fn client_identity_defaults_to_unknown() {
        assert_eq!(client_identity(&HeaderMap::new()), "unknown");

        let mut blank = HeaderMap::new();
        blank.insert("x-forwarded-for", HeaderValue::from_static(" , 10.0.0.1"));
        assert_eq!(client_identity(&blank), "unknown");
    }
}
