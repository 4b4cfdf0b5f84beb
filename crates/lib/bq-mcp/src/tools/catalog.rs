use bq_core::warehouse::Warehouse;
use bq_store::schema::split_table_name;
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ErrorCode},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::BigQueryMcp;
use crate::helpers::{self, map_control_err};

/// Parameters for listing tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListTablesParams {
    /// Dataset to list. When omitted, every visible dataset is listed and
    /// names are returned as `dataset.table`.
    pub dataset_id: Option<String>,
}

/// Parameters for describing a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DescribeTableParams {
    /// Qualified `dataset.table` name.
    pub table_name: Option<String>,
    pub dataset_id: Option<String>,
    pub table_id: Option<String>,
}

impl DescribeTableParams {
    /// Resolves the target as `(dataset_id, table_id)`.
    ///
    /// `table_name` wins when present; otherwise both `dataset_id` and
    /// `table_id` are required.
    ///
    /// # Errors
    /// Returns a message describing the missing or malformed parameter.
    pub fn resolve(&self) -> Result<(String, String), String> {
        if let Some(name) = non_blank(self.table_name.as_deref()) {
            return split_table_name(name)
                .map(|(dataset, table)| (dataset.to_string(), table.to_string()))
                .ok_or_else(|| format!("table_name must be dataset.table, got '{name}'"));
        }
        match (
            non_blank(self.dataset_id.as_deref()),
            non_blank(self.table_id.as_deref()),
        ) {
            (Some(dataset), Some(table)) => Ok((dataset.to_string(), table.to_string())),
            _ => Err("provide table_name or both dataset_id and table_id".to_string()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[tool_router(router = tool_router_catalog, vis = "pub")]
impl<W: Warehouse> BigQueryMcp<W> {
    #[tool(description = "List dataset ids in the configured project.")]
    async fn list_datasets(&self) -> Result<CallToolResult, ErrorData> {
        let datasets = self
            .control
            .list_datasets()
            .await
            .map_err(map_control_err)?;
        let ids: Vec<String> = datasets
            .into_iter()
            .map(|dataset| dataset.dataset_id)
            .collect();
        Ok(CallToolResult::success(vec![Content::json(ids)?]))
    }

    #[tool(
        description = "List tables. With dataset_id returns table ids; without it returns dataset.table names across all datasets."
    )]
    async fn list_tables(
        &self,
        Parameters(params): Parameters<ListTablesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let names = match non_blank(params.dataset_id.as_deref()) {
            Some(dataset_id) => self
                .control
                .list_tables(dataset_id)
                .await
                .map_err(map_control_err)?
                .into_iter()
                .map(|table| table.table_id)
                .collect(),
            None => self
                .control
                .list_all_tables()
                .await
                .map_err(map_control_err)?,
        };
        Ok(CallToolResult::success(vec![Content::json(names)?]))
    }

    #[tool(
        description = "Describe a table's schema. Pass table_name as dataset.table, or dataset_id and table_id."
    )]
    async fn describe_table(
        &self,
        Parameters(params): Parameters<DescribeTableParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let (dataset_id, table_id) = params
            .resolve()
            .map_err(|message| helpers::mcp_err(ErrorCode::INVALID_PARAMS, message))?;
        let fields = self
            .control
            .describe_table(&dataset_id, &table_id)
            .await
            .map_err(map_control_err)?;
        Ok(CallToolResult::success(vec![Content::json(fields)?]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_takes_precedence() {
        let params = DescribeTableParams {
            table_name: Some("sales.orders".into()),
            dataset_id: Some("other".into()),
            table_id: Some("ignored".into()),
        };
        assert_eq!(
            params.resolve(),
            Ok(("sales".to_string(), "orders".to_string()))
        );
    }

    #[test]
    fn falls_back_to_split_identifiers() {
        let params = DescribeTableParams {
            table_name: Some("  ".into()),
            dataset_id: Some("sales".into()),
            table_id: Some("orders".into()),
        };
        assert_eq!(
            params.resolve(),
            Ok(("sales".to_string(), "orders".to_string()))
        );
    }

    #[test]
    fn rejects_incomplete_targets() {
        assert!(DescribeTableParams::default().resolve().is_err());
        let only_dataset = DescribeTableParams {
            dataset_id: Some("sales".into()),
            ..Default::default()
        };
        assert!(only_dataset.resolve().is_err());
        let unqualified = DescribeTableParams {
            table_name: Some("orders".into()),
            ..Default::default()
        };
        assert!(unqualified.resolve().is_err());
        let overqualified = DescribeTableParams {
            table_name: Some("a.b.c.d".into()),
            ..Default::default()
        };
        assert!(overqualified.resolve().is_err());
    }
}
