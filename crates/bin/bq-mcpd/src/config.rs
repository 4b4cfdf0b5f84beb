use bq_core::config::{ConfigError, WarehouseArgs, WarehouseConfig};
use bq_mcp::server::McpHttpServerConfig;
use clap::{Parser, builder::BoolishValueParser};
use std::net::SocketAddr;

const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:4020";

#[derive(Parser, Debug)]
#[command(name = "bq-mcpd", version, about = "BigQuery MCP daemon.")]
struct CliArgs {
    #[command(flatten)]
    warehouse: WarehouseArgs,

    /// Serve MCP over stdin/stdout. When disabled, streamable HTTP is used.
    #[arg(
        long = "stdio",
        env = "BQ_MCP_STDIO",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    enable_stdio: bool,

    #[arg(long, env = "BQ_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
    http_addr: SocketAddr,

    /// Serve streamable HTTP without per-client sessions.
    #[arg(
        long = "http-stateless",
        env = "BQ_MCP_HTTP_STATELESS",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    http_stateless: bool,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Debug, Clone)]
pub struct McpdConfig {
    pub warehouse: WarehouseConfig,
    pub enable_stdio: bool,
    pub http: McpHttpServerConfig,
}

impl McpdConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        Self::try_from(CliArgs::parse())
    }
}

impl TryFrom<CliArgs> for McpdConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            warehouse: WarehouseConfig::from_args(args.warehouse)?,
            enable_stdio: args.enable_stdio,
            http: McpHttpServerConfig::new(args.http_addr)
                .with_stateful_mode(!args.http_stateless),
        })
    }
}
