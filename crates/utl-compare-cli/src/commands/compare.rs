use std::sync::Arc;

use utl_compare_core::{
    CompareConfig, CompareQuery, CounterWarehouse, DuckDbCounterStore, HttpClient,
};
use utl_compare_warehouse::WarehouseConfig;

use crate::cli::CompareArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &CompareArgs,
    config: &CompareConfig,
    http_client: Arc<dyn HttpClient>,
) -> Result<CommandResult, CliError> {
    let warehouse = CounterWarehouse::open(match &config.counter_db {
        Some(path) => WarehouseConfig::at(path),
        None => WarehouseConfig::default(),
    })?;
    let service = config.service(http_client, Arc::new(DuckDbCounterStore::new(warehouse)));

    let query = CompareQuery {
        metric: args.metric.clone(),
        top_n: args.top_n.clone(),
        sum: args.sum.clone(),
        file1: args.file1.clone(),
        file2: args.file2.clone(),
    };

    let response = service.compare(&args.client, &query).await?;
    Ok(CommandResult::ok(serde_json::to_value(response)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use utl_compare_core::{OfflineHttpClient, RateLimitPolicy, FALLBACK_DOMAIN};

    fn args(metric: Option<&str>) -> CompareArgs {
        CompareArgs {
            metric: metric.map(str::to_owned),
            top_n: None,
            sum: Some(String::from("brief")),
            file1: None,
            file2: None,
            client: String::from("test"),
        }
    }

    fn offline_config(db: &std::path::Path) -> CompareConfig {
        CompareConfig::default()
            .with_fetch_timeout(Duration::from_millis(20))
            .with_counter_db(db)
            .with_rate_limit(RateLimitPolicy::new(1, 60_000))
    }

    #[tokio::test]
    async fn offline_compare_serves_fallback_with_fallback_summary() {
        let temp = tempdir().expect("tempdir");
        let config = offline_config(&temp.path().join("counters.duckdb"));

        let result = run(&args(Some("efficiency")), &config, Arc::new(OfflineHttpClient))
            .await
            .expect("compare");

        assert_eq!(result.data["dataSource"], "fallback");
        assert_eq!(result.data["metric"], "efficiency");
        assert_eq!(result.data["domains"][0]["domain"], FALLBACK_DOMAIN);
        assert!(result.data["summary"]
            .as_str()
            .is_some_and(|summary| summary.contains("efficiency")));
    }

    #[tokio::test]
    async fn second_invocation_over_the_same_database_is_rate_limited() {
        let temp = tempdir().expect("tempdir");
        let config = offline_config(&temp.path().join("counters.duckdb"));

        run(&args(None), &config, Arc::new(OfflineHttpClient))
            .await
            .expect("first call admitted");
        let error = run(&args(None), &config, Arc::new(OfflineHttpClient))
            .await
            .err()
            .expect("second call limited");

        assert_eq!(error.exit_code(), 7);
    }

    #[tokio::test]
    async fn unknown_metric_exits_with_contract_violation() {
        let temp = tempdir().expect("tempdir");
        let config = offline_config(&temp.path().join("counters.duckdb"));

        let error = run(&args(Some("accuracy")), &config, Arc::new(OfflineHttpClient))
            .await
            .err()
            .expect("unknown metric");

        assert_eq!(error.exit_code(), 2);
    }
}
