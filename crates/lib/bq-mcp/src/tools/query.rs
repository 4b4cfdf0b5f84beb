use bq_core::warehouse::Warehouse;
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::BigQueryMcp;
use crate::helpers::map_control_err;

/// Parameters for running a query.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExecuteQueryParams {
    /// Standard SQL text.
    pub query: String,
}

#[tool_router(router = tool_router_query, vis = "pub")]
impl<W: Warehouse> BigQueryMcp<W> {
    #[tool(description = "Run a standard SQL query and return the rows as JSON objects.")]
    async fn execute_query(
        &self,
        Parameters(params): Parameters<ExecuteQueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .control
            .execute_query(&params.query)
            .await
            .map_err(map_control_err)?;
        Ok(CallToolResult::success(vec![Content::json(result.rows)?]))
    }
}
