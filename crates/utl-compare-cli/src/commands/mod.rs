mod compare;
mod health;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use utl_compare_core::{CompareConfig, HttpClient, OfflineHttpClient, ReqwestHttpClient};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    /// Set when the command completed but reports an unavailable dependency.
    pub unhealthy: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            unhealthy: false,
        }
    }

    pub fn with_unhealthy(mut self, unhealthy: bool) -> Self {
        self.unhealthy = unhealthy;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let config = config_for(cli, CompareConfig::from_env());
    let http_client: Arc<dyn HttpClient> = if cli.offline {
        Arc::new(OfflineHttpClient)
    } else {
        Arc::new(ReqwestHttpClient::new())
    };

    match &cli.command {
        Command::Compare(args) => compare::run(args, &config, http_client).await,
        Command::Health => health::run(&config, http_client).await,
    }
}

/// Applies command-line overrides on top of `base`.
fn config_for(cli: &Cli, base: CompareConfig) -> CompareConfig {
    let mut config = base;
    if let Some(feed_url) = &cli.feed_url {
        config = config.with_feed_url(feed_url.clone());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_fetch_timeout(Duration::from_millis(timeout_ms));
    }
    if let Some(counter_db) = &cli.counter_db {
        config = config.with_counter_db(counter_db.clone());
    }
    config
}
