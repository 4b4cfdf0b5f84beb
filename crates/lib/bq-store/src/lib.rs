//! Warehouse metadata models and naming helpers for bq-mcp.
//!
//! This crate defines the read-only projections of dataset, table, and query
//! metadata shared by the warehouse clients, the control plane, and the MCP
//! tools.

pub mod models;
pub mod schema;

pub use models::*;
