use bq_store::models::QueryResult;
use tracing::info;

use crate::warehouse::Warehouse;

use super::{ControlError, WarehouseControlPlane};

impl<W: Warehouse> WarehouseControlPlane<W> {
    /// Runs a standard SQL query and returns every row.
    ///
    /// # Errors
    /// Returns `ControlError::InvalidInput` for blank SQL, or the warehouse
    /// error when the query fails.
    pub async fn execute_query(&self, sql: &str) -> Result<QueryResult, ControlError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(ControlError::InvalidInput("query is required".to_string()));
        }
        info!(query = sql, "executing query");
        let result = self.warehouse.run_query(sql).await?;
        info!(
            rows = result.row_count(),
            job_id = result.job_id.as_deref().unwrap_or("-"),
            "query returned"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;
    use bq_store::models::FieldSchema;
    use serde_json::{Map, json};

    #[tokio::test]
    async fn returns_rows_for_known_query() {
        let mut row = Map::new();
        row.insert("test".to_string(), json!(1));
        let warehouse = MemoryWarehouse::new("acme").with_query_result(
            "SELECT 1 as test",
            QueryResult::new(vec![FieldSchema::new("test", "INTEGER")], vec![row]),
        );

        let control = WarehouseControlPlane::new(warehouse);
        let result = control
            .execute_query("SELECT 1 as test;".trim_end_matches(';'))
            .await
            .expect("query should succeed");
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.rows[0]["test"], json!(1));
    }

    #[tokio::test]
    async fn blank_query_is_rejected_before_the_warehouse() {
        let control = WarehouseControlPlane::new(MemoryWarehouse::new("acme"));
        let err = control.execute_query("   ").await.expect_err("blank query");
        assert!(matches!(err, ControlError::InvalidInput(_)));
    }
}
