use bq_store::models::{DatasetSummary, FieldSchema, TableSchema, TableSummary};
use tracing::info;

use crate::warehouse::Warehouse;

use super::{ControlError, WarehouseControlPlane, require_identifier};

impl<W: Warehouse> WarehouseControlPlane<W> {
    /// Lists datasets in the project, applying the dataset filter if set.
    ///
    /// # Errors
    /// Returns `ControlError` if the warehouse call fails.
    pub async fn list_datasets(&self) -> Result<Vec<DatasetSummary>, ControlError> {
        let all = self.warehouse.list_datasets().await?;
        let datasets = match self.dataset_filter.as_deref() {
            Some(filter) => {
                let matched: Vec<_> = all
                    .into_iter()
                    .filter(|dataset| dataset.dataset_id == filter)
                    .collect();
                if matched.is_empty() {
                    info!(filter, "no datasets match filter");
                }
                matched
            }
            None => all,
        };
        info!(
            project = self.warehouse.project(),
            count = datasets.len(),
            "listed datasets"
        );
        Ok(datasets)
    }

    /// Lists tables in one dataset.
    ///
    /// # Errors
    /// Returns `ControlError::InvalidInput` for a blank dataset id, or the
    /// warehouse error.
    pub async fn list_tables(&self, dataset_id: &str) -> Result<Vec<TableSummary>, ControlError> {
        let dataset_id = require_identifier(dataset_id, "dataset_id")?;
        let tables = self.warehouse.list_tables(&dataset_id).await?;
        info!(%dataset_id, count = tables.len(), "listed tables");
        Ok(tables)
    }

    /// Lists `dataset.table` names across every visible dataset.
    ///
    /// # Errors
    /// Returns `ControlError` if any listing fails.
    pub async fn list_all_tables(&self) -> Result<Vec<String>, ControlError> {
        let mut names = Vec::new();
        for dataset in self.list_datasets().await? {
            let tables = self.list_tables(&dataset.dataset_id).await?;
            names.extend(tables.iter().map(TableSummary::qualified_name));
        }
        Ok(names)
    }

    /// Fetches full table metadata.
    ///
    /// # Errors
    /// Returns `ControlError` for blank identifiers or warehouse failures.
    pub async fn get_table(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<TableSchema, ControlError> {
        let dataset_id = require_identifier(dataset_id, "dataset_id")?;
        let table_id = require_identifier(table_id, "table_id")?;
        Ok(self.warehouse.get_table(&dataset_id, &table_id).await?)
    }

    /// Returns the ordered field descriptors of a table.
    ///
    /// # Errors
    /// Returns `ControlError` for blank identifiers or warehouse failures.
    pub async fn describe_table(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<Vec<FieldSchema>, ControlError> {
        let table = self.get_table(dataset_id, table_id).await?;
        info!(
            dataset_id = %table.dataset_id,
            table_id = %table.table_id,
            fields = table.fields.len(),
            "described table"
        );
        Ok(table.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{MemoryWarehouse, WarehouseError};
    use bq_store::models::FieldMode;

    fn warehouse() -> MemoryWarehouse {
        MemoryWarehouse::new("acme")
            .with_dataset("staging")
            .with_table(TableSchema::new(
                "sales",
                "orders",
                vec![
                    FieldSchema::new("id", "INTEGER").with_mode(FieldMode::Required),
                    FieldSchema::new("total", "NUMERIC").with_description("order total"),
                ],
            ))
            .with_table(TableSchema::new("sales", "customers", Vec::new()))
    }

    #[tokio::test]
    async fn filter_keeps_exact_match_only() {
        let control = WarehouseControlPlane::new(warehouse())
            .with_dataset_filter(Some("sales".to_string()));
        let datasets = control.list_datasets().await.expect("datasets");
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].dataset_id, "sales");

        let control = WarehouseControlPlane::new(warehouse())
            .with_dataset_filter(Some("sal".to_string()));
        assert!(control.list_datasets().await.expect("datasets").is_empty());
    }

    #[tokio::test]
    async fn blank_filter_is_ignored() {
        let control =
            WarehouseControlPlane::new(warehouse()).with_dataset_filter(Some("  ".to_string()));
        assert!(control.dataset_filter().is_none());
        assert_eq!(control.list_datasets().await.expect("datasets").len(), 2);
    }

    #[tokio::test]
    async fn list_all_tables_qualifies_names() {
        let control = WarehouseControlPlane::new(warehouse());
        let names = control.list_all_tables().await.expect("tables");
        assert_eq!(names, vec!["sales.customers", "sales.orders"]);
    }

    #[tokio::test]
    async fn describe_table_returns_ordered_fields() {
        let control = WarehouseControlPlane::new(warehouse());
        let fields = control.describe_table("sales", "orders").await.expect("schema");
        let names: Vec<_> = fields.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(names, vec!["id", "total"]);
        assert_eq!(fields[0].mode, FieldMode::Required);
    }

    #[tokio::test]
    async fn rejects_blank_identifiers() {
        let control = WarehouseControlPlane::new(warehouse());
        assert!(matches!(
            control.list_tables(" ").await,
            Err(ControlError::InvalidInput(_))
        ));
        assert!(matches!(
            control.describe_table("sales", "").await,
            Err(ControlError::InvalidInput(_))
        ));
        assert!(matches!(
            control.describe_table("sales", "missing").await,
            Err(ControlError::Warehouse(WarehouseError::NotFound(_)))
        ));
    }
}
