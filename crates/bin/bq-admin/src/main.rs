//! Direct BigQuery admin CLI.
//!
//! Runs one administrative operation against the warehouse and prints the
//! result to stdout. Diagnostics go to stderr; any failure exits with 1.

mod render;

use std::error::Error;
use std::fmt;
use std::process::ExitCode;

use bq_core::config::{ConfigError, WarehouseArgs, WarehouseConfig};
use bq_core::control::{ControlError, WarehouseControlPlane};
use bq_core::telemetry;
use bq_core::warehouse::{BigQueryRestClient, WarehouseError};
use bq_store::schema::make_table_name;
use clap::{Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "bq-admin", version, about = "Direct BigQuery admin CLI.")]
struct Cli {
    #[command(flatten)]
    warehouse: WarehouseArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// List datasets in the project (the default).
    #[command(name = "list_datasets")]
    ListDatasets,
    /// List tables in a dataset.
    #[command(name = "list_tables")]
    ListTables { dataset_id: String },
    /// Print a table's schema as JSON.
    #[command(name = "describe_table")]
    DescribeTable { dataset_id: String, table_id: String },
    /// Run a standard SQL query and print the rows as JSON.
    #[command(name = "execute_query")]
    ExecuteQuery { query: String },
    /// Exercise every operation once.
    #[command(name = "test")]
    Test,
}

#[derive(Debug)]
enum AdminError {
    Config(ConfigError),
    Warehouse(WarehouseError),
    Control(ControlError),
    Output(serde_json::Error),
    SmokeFailed,
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Warehouse(err) => write!(f, "{err}"),
            Self::Control(err) => write!(f, "{err}"),
            Self::Output(err) => write!(f, "failed to render output: {err}"),
            Self::SmokeFailed => f.write_str("test finished with errors"),
        }
    }
}

impl Error for AdminError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Warehouse(err) => Some(err),
            Self::Control(err) => Some(err),
            Self::Output(err) => Some(err),
            Self::SmokeFailed => None,
        }
    }
}

impl From<ConfigError> for AdminError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<WarehouseError> for AdminError {
    fn from(err: WarehouseError) -> Self {
        Self::Warehouse(err)
    }
}

impl From<ControlError> for AdminError {
    fn from(err: ControlError) -> Self {
        Self::Control(err)
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output(err)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_stderr_logging();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "bq-admin failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AdminError> {
    let config = WarehouseConfig::from_args(cli.warehouse)?;
    info!(
        project = %config.project,
        location = %config.location,
        credentials = %config.credentials,
        "connecting to BigQuery"
    );
    let client = BigQueryRestClient::from_config(&config)?;
    let control =
        WarehouseControlPlane::new(client).with_dataset_filter(config.dataset_filter.clone());

    match cli.command.unwrap_or(Command::ListDatasets) {
        Command::ListDatasets => {
            let datasets = control.list_datasets().await?;
            println!("{}", render::dataset_list(&datasets, control.dataset_filter()));
        }
        Command::ListTables { dataset_id } => {
            let tables = control.list_tables(&dataset_id).await?;
            println!(
                "{}",
                render::table_list(&dataset_id, &render::table_ids(&tables))
            );
        }
        Command::DescribeTable {
            dataset_id,
            table_id,
        } => {
            let fields = control.describe_table(&dataset_id, &table_id).await?;
            println!("Schema for {}:", make_table_name(&dataset_id, &table_id));
            println!("{}", render::pretty_json(&fields)?);
        }
        Command::ExecuteQuery { query } => {
            let result = control.execute_query(&query).await?;
            println!("Query returned {} rows", result.row_count());
            println!("{}", render::pretty_json(&result.rows)?);
        }
        Command::Test => {
            let report = control.run_smoke_test().await?;
            println!("{}", render::smoke_report(&report)?);
            if !report.is_success() {
                return Err(AdminError::SmokeFailed);
            }
            println!("\nTest completed successfully!");
        }
    }
    Ok(())
}
