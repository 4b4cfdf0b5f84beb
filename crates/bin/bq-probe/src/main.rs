//! Probe CLI for a BigQuery MCP server.
//!
//! Spawns the server as a subprocess, performs the MCP handshake within a
//! bounded wait, and invokes tools over the stdio transport. The server
//! inherits this process's environment, so warehouse settings pass through.

use std::error::Error;
use std::fmt;
use std::process::ExitCode;
use std::time::Duration;

use bq_core::telemetry;
use bq_mcp::client::{ClientError, DEFAULT_CONNECT_TIMEOUT, StdioServer, render_tool_result};
use bq_store::schema::{SMOKE_TEST_QUERY, TOOL_DESCRIBE_TABLE, TOOL_EXECUTE_QUERY, TOOL_LIST_TABLES};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::{error, info, warn};

const DEFAULT_SERVER: &str = "bq-mcpd";

#[derive(Parser, Debug)]
#[command(name = "bq-probe", version, about = "Drive a BigQuery MCP server over stdio.")]
struct Cli {
    /// Server executable to spawn.
    #[arg(long, env = "BQ_PROBE_SERVER", default_value = DEFAULT_SERVER, global = true)]
    server: String,

    /// Argument passed to the server; repeat for several.
    #[arg(long = "server-arg", allow_hyphen_values = true, global = true)]
    server_args: Vec<String>,

    /// Seconds to wait for the handshake before giving up.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs(), global = true)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Handshake only.
    Connect,
    /// List the server's tools.
    Tools,
    /// Call list_tables, execute_query, and optionally describe_table.
    Smoke {
        /// Table to describe, as dataset.table.
        #[arg(long)]
        table: Option<String>,
    },
    /// Call any tool with JSON object arguments.
    Call {
        tool: String,
        arguments: Option<String>,
    },
}

#[derive(Debug)]
enum ProbeError {
    Client(ClientError),
    InvalidArguments(String),
    ToolFailed(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(err) => write!(f, "{err}"),
            Self::InvalidArguments(message) => write!(f, "invalid tool arguments: {message}"),
            Self::ToolFailed(tools) => write!(f, "tool call failed: {tools}"),
        }
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Client(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ClientError> for ProbeError {
    fn from(err: ClientError) -> Self {
        Self::Client(err)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_stderr_logging();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "bq-probe failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ProbeError> {
    let arguments = match &cli.command {
        Command::Call { arguments, .. } => Some(parse_arguments(arguments.as_deref())?),
        _ => None,
    };

    let timeout = Duration::from_secs(cli.timeout_secs);
    info!(server = %cli.server, args = ?cli.server_args, "starting server");
    let mut server = StdioServer::spawn(&cli.server, &cli.server_args)?
        .with_client_info("bq-probe", env!("CARGO_PKG_VERSION"));

    let outcome = session(&mut server, &cli.command, arguments, timeout).await;
    if let Err(err) = server.shutdown().await {
        warn!(error = %err, "server shutdown failed");
    }
    outcome
}

async fn session(
    server: &mut StdioServer,
    command: &Command,
    arguments: Option<Value>,
    timeout: Duration,
) -> Result<(), ProbeError> {
    let init = server.connect_with_timeout(timeout).await?;
    println!(
        "Connected to {} {} (protocol {})",
        init.server_info.name, init.server_info.version, init.protocol_version
    );

    match command {
        Command::Connect => Ok(()),
        Command::Tools => {
            let tools = server.client().list_tools().await?;
            println!("Available tools:");
            for tool in tools {
                match tool.description {
                    Some(description) => println!("- {}: {description}", tool.name),
                    None => println!("- {}", tool.name),
                }
            }
            Ok(())
        }
        Command::Smoke { table } => {
            let mut calls = vec![
                (TOOL_LIST_TABLES, json!({})),
                (TOOL_EXECUTE_QUERY, json!({ "query": SMOKE_TEST_QUERY })),
            ];
            if let Some(table) = table {
                calls.push((TOOL_DESCRIBE_TABLE, json!({ "table_name": table })));
            }
            let mut failed = Vec::new();
            for (tool, arguments) in calls {
                if !call_and_print(server, tool, arguments).await? {
                    failed.push(tool);
                }
            }
            if failed.is_empty() {
                println!("\nAll tool calls succeeded.");
                Ok(())
            } else {
                Err(ProbeError::ToolFailed(failed.join(", ")))
            }
        }
        Command::Call { tool, .. } => {
            let arguments = arguments.unwrap_or_else(|| json!({}));
            if call_and_print(server, tool, arguments).await? {
                Ok(())
            } else {
                Err(ProbeError::ToolFailed(tool.clone()))
            }
        }
    }
}

/// Calls a tool and prints its rendered result. Returns whether the call
/// succeeded; server-side tool errors are printed, transport errors are not
/// recoverable.
async fn call_and_print(
    server: &mut StdioServer,
    tool: &str,
    arguments: Value,
) -> Result<bool, ProbeError> {
    println!("\n{tool} {arguments}:");
    match server.client().call_tool(tool, arguments).await {
        Ok(result) => {
            println!("{}", render_tool_result(&result));
            Ok(!result.is_error())
        }
        Err(ClientError::Rpc { code, message }) => {
            println!("Error {code}: {message}");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

fn parse_arguments(raw: Option<&str>) -> Result<Value, ProbeError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(json!({}));
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(ProbeError::InvalidArguments(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(err) => Err(ProbeError::InvalidArguments(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_daemon() {
        let cli = Cli::try_parse_from(["bq-probe", "connect"]).expect("connect should parse");
        assert_eq!(cli.server, DEFAULT_SERVER);
        assert_eq!(cli.timeout_secs, 10);
        assert!(cli.server_args.is_empty());
        assert_eq!(cli.command, Command::Connect);
    }

    #[test]
    fn server_args_accept_flags() {
        let cli = Cli::try_parse_from([
            "bq-probe",
            "--server",
            "./target/debug/bq-mcpd",
            "--server-arg",
            "--dataset-filter",
            "--server-arg",
            "sales",
            "smoke",
            "--table",
            "sales.orders",
        ])
        .expect("smoke should parse");
        assert_eq!(cli.server_args, vec!["--dataset-filter", "sales"]);
        assert_eq!(
            cli.command,
            Command::Smoke {
                table: Some("sales.orders".to_string())
            }
        );
    }

    #[test]
    fn call_arguments_must_be_an_object() {
        assert_eq!(parse_arguments(None).expect("empty"), json!({}));
        assert_eq!(
            parse_arguments(Some(r#"{"dataset_id":"sales"}"#)).expect("object"),
            json!({ "dataset_id": "sales" })
        );
        assert!(matches!(
            parse_arguments(Some("[1,2]")),
            Err(ProbeError::InvalidArguments(_))
        ));
        assert!(matches!(
            parse_arguments(Some("{not json")),
            Err(ProbeError::InvalidArguments(_))
        ));
    }
}
