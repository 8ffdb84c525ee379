use std::process::ExitCode;

use utl_compare_core::CompareConfig;
use utl_compare_web::{init_tracing, serve};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match serve(CompareConfig::from_env()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "server stopped");
            ExitCode::FAILURE
        }
    }
}
