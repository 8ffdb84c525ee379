use std::sync::Arc;

use utl_compare_core::{CompareConfig, HttpClient};

use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    config: &CompareConfig,
    http_client: Arc<dyn HttpClient>,
) -> Result<CommandResult, CliError> {
    let report = config.health_probe(http_client).run().await;
    let unavailable = report.status_code() == 503;
    Ok(CommandResult::ok(serde_json::to_value(report)?).with_unhealthy(unavailable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use utl_compare_core::OfflineHttpClient;

    #[tokio::test]
    async fn offline_health_is_unavailable() {
        let config = CompareConfig::default().with_fetch_timeout(Duration::from_millis(20));

        let result = run(&config, Arc::new(OfflineHttpClient))
            .await
            .expect("health");

        assert!(result.unhealthy);
        assert_eq!(result.data["ok"], false);
        assert_eq!(result.data["components"][0]["status"], "degraded");
        assert_eq!(result.data["components"][1]["status"], "fail");
    }
}
