//! Core types and services for bq-mcp.
//!
//! This crate owns warehouse configuration and credentials, the `Warehouse`
//! trait with its BigQuery REST and in-memory implementations, and the control
//! plane that runs administrative operations against a warehouse.

pub mod auth;
pub mod config;
pub mod control;
pub mod telemetry;
pub mod warehouse;
