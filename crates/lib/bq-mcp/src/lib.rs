//! MCP server and client for bq-mcp.
//!
//! This crate wires the warehouse control plane into rmcp tool handlers and
//! exposes the MCP-facing API surface for catalog browsing and queries. It
//! also carries the stdio probe client used to drive a server subprocess.

mod helpers;
pub mod client;
pub mod server;
pub mod tools;

use bq_core::control::WarehouseControlPlane;
use bq_core::warehouse::Warehouse;
use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};

pub use helpers::map_control_err;

const SERVER_INSTRUCTIONS: &str = r"bq-mcp exposes administrative BigQuery operations as MCP tools.

Workflow:
1. Call `list_datasets` to see the datasets visible to the configured project.
2. Call `list_tables` with a `dataset_id` to list its tables, or with no arguments to list
   every table as `dataset.table`.
3. Call `describe_table` with `table_name` (`dataset.table`) or with `dataset_id` and
   `table_id` to get the ordered field descriptors.
4. Call `execute_query` with a standard SQL `query` to get rows as JSON objects.

Notes:
- Every response is a single text item holding JSON.
- A configured dataset filter restricts `list_datasets` and the unscoped `list_tables`.
- `health` returns `ok`.";

/// MCP server wrapper around the warehouse control plane and tool routers.
pub struct BigQueryMcp<W: Warehouse> {
    tool_router: ToolRouter<Self>,
    control: WarehouseControlPlane<W>,
}

impl<W: Warehouse> Clone for BigQueryMcp<W> {
    fn clone(&self) -> Self {
        Self {
            tool_router: self.tool_router.clone(),
            control: self.control.clone(),
        }
    }
}

impl<W: Warehouse> BigQueryMcp<W> {
    #[must_use]
    pub fn new(control: WarehouseControlPlane<W>) -> Self {
        let tool_router =
            Self::tool_router_core() + Self::tool_router_catalog() + Self::tool_router_query();
        Self {
            tool_router,
            control,
        }
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl<W: Warehouse> BigQueryMcp<W> {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

#[tool_handler]
impl<W: Warehouse> ServerHandler for BigQueryMcp<W> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
