//! Warehouse access: the `Warehouse` trait and its implementations.
//!
//! `BigQueryRestClient` talks to the BigQuery v2 REST API; `MemoryWarehouse`
//! serves seeded metadata and canned query results.

mod decode;
pub mod memory;
pub mod rest;

use std::error::Error;
use std::fmt;
use std::future::Future;

use bq_store::models::{DatasetSummary, QueryResult, TableSchema, TableSummary};

use crate::auth::AuthError;

pub use memory::MemoryWarehouse;
pub use rest::BigQueryRestClient;

#[derive(Debug)]
pub enum WarehouseError {
    Auth(AuthError),
    Transport(String),
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },
    NotFound(String),
    Decode(String),
    Timeout(String),
}

impl fmt::Display for WarehouseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{err}"),
            Self::Transport(message) => write!(f, "warehouse request failed: {message}"),
            Self::Api {
                status,
                reason,
                message,
            } => match reason {
                Some(reason) => write!(f, "warehouse API error {status} ({reason}): {message}"),
                None => write!(f, "warehouse API error {status}: {message}"),
            },
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Decode(message) => write!(f, "failed to decode warehouse response: {message}"),
            Self::Timeout(message) => write!(f, "timed out: {message}"),
        }
    }
}

impl Error for WarehouseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AuthError> for WarehouseError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<reqwest::Error> for WarehouseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Read-only administrative access to a tabular data warehouse.
pub trait Warehouse: Send + Sync + 'static {
    /// Project the warehouse operates in.
    fn project(&self) -> &str;

    fn list_datasets(&self) -> impl Future<Output = WarehouseResult<Vec<DatasetSummary>>> + Send;

    fn list_tables(
        &self,
        dataset_id: &str,
    ) -> impl Future<Output = WarehouseResult<Vec<TableSummary>>> + Send;

    fn get_table(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> impl Future<Output = WarehouseResult<TableSchema>> + Send;

    fn run_query(&self, sql: &str) -> impl Future<Output = WarehouseResult<QueryResult>> + Send;
}
