//! Daemon entry point for the BigQuery MCP server.
//!
//! Loads configuration from flags and the environment, builds the REST
//! warehouse client, and serves the MCP protocol over stdio or streamable HTTP.

mod config;

use bq_core::control::WarehouseControlPlane;
use bq_core::telemetry;
use bq_core::warehouse::BigQueryRestClient;
use bq_mcp::server::{serve_stdio, serve_streamable_http};
use tracing::info;

use crate::config::McpdConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    telemetry::init_stderr_logging();
    let config = McpdConfig::from_args()?;
    let client = BigQueryRestClient::from_config(&config.warehouse)?;
    let control = WarehouseControlPlane::new(client)
        .with_dataset_filter(config.warehouse.dataset_filter.clone());

    info!(
        project = %config.warehouse.project,
        location = %config.warehouse.location,
        credentials = %config.warehouse.credentials,
        stdio = config.enable_stdio,
        "starting bq-mcpd"
    );

    if config.enable_stdio {
        serve_stdio(control).await
    } else {
        serve_streamable_http(control, config.http).await
    }
}
