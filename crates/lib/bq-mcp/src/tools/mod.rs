//! MCP tool modules.
//!
//! Tools are grouped by domain: catalog browsing (datasets, tables, schemas)
//! and query execution.

pub mod catalog;
pub mod query;
