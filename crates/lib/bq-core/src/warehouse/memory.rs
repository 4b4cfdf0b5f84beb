use std::collections::{BTreeMap, HashMap};

use bq_store::models::{DatasetSummary, QueryResult, TableSchema, TableSummary};

use super::{Warehouse, WarehouseError, WarehouseResult};

#[derive(Default)]
struct MemoryState {
    datasets: BTreeMap<String, MemoryDataset>,
    queries: HashMap<String, Result<QueryResult, String>>,
    table_errors: HashMap<(String, String), String>,
}

struct MemoryDataset {
    summary: DatasetSummary,
    tables: BTreeMap<String, TableSchema>,
}

/// In-memory warehouse with seeded metadata and canned query results.
///
/// Queries are matched on their whitespace-normalized text; anything not
/// registered returns `WarehouseError::NotFound`.
pub struct MemoryWarehouse {
    project: String,
    state: MemoryState,
}

impl MemoryWarehouse {
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            state: MemoryState::default(),
        }
    }

    /// Adds an empty dataset, keeping any tables it already has.
    #[must_use]
    pub fn with_dataset(mut self, dataset_id: &str) -> Self {
        let summary = DatasetSummary::new(self.project.clone(), dataset_id);
        self.state
            .datasets
            .entry(dataset_id.to_string())
            .or_insert_with(|| MemoryDataset {
                summary,
                tables: BTreeMap::new(),
            });
        self
    }

    /// Adds a table, creating its dataset when missing.
    #[must_use]
    pub fn with_table(self, table: TableSchema) -> Self {
        let mut this = self.with_dataset(&table.dataset_id);
        if let Some(dataset) = this.state.datasets.get_mut(&table.dataset_id) {
            dataset.tables.insert(table.table_id.clone(), table);
        }
        this
    }

    #[must_use]
    pub fn with_query_result(mut self, sql: &str, result: QueryResult) -> Self {
        self.state.queries.insert(normalize_sql(sql), Ok(result));
        self
    }

    /// Adds a table that is listed but fails to describe with the given
    /// warehouse message.
    #[must_use]
    pub fn with_table_error(mut self, dataset_id: &str, table_id: &str, message: &str) -> Self {
        self = self.with_table(TableSchema::new(dataset_id, table_id, Vec::new()));
        self.state.table_errors.insert(
            (dataset_id.to_string(), table_id.to_string()),
            message.to_string(),
        );
        self
    }

    /// Registers a query that fails with the given warehouse message.
    #[must_use]
    pub fn with_query_error(mut self, sql: &str, message: &str) -> Self {
        self.state
            .queries
            .insert(normalize_sql(sql), Err(message.to_string()));
        self
    }
}

impl Warehouse for MemoryWarehouse {
    fn project(&self) -> &str {
        &self.project
    }

    async fn list_datasets(&self) -> WarehouseResult<Vec<DatasetSummary>> {
        Ok(self
            .state
            .datasets
            .values()
            .map(|dataset| dataset.summary.clone())
            .collect())
    }

    async fn list_tables(&self, dataset_id: &str) -> WarehouseResult<Vec<TableSummary>> {
        let dataset = self
            .state
            .datasets
            .get(dataset_id)
            .ok_or_else(|| WarehouseError::NotFound(format!("dataset {dataset_id}")))?;
        Ok(dataset.tables.values().map(TableSchema::summary).collect())
    }

    async fn get_table(&self, dataset_id: &str, table_id: &str) -> WarehouseResult<TableSchema> {
        if let Some(message) = self
            .state
            .table_errors
            .get(&(dataset_id.to_string(), table_id.to_string()))
        {
            return Err(WarehouseError::Api {
                status: 403,
                reason: Some("accessDenied".to_string()),
                message: message.clone(),
            });
        }
        self.state
            .datasets
            .get(dataset_id)
            .and_then(|dataset| dataset.tables.get(table_id))
            .cloned()
            .ok_or_else(|| WarehouseError::NotFound(format!("table {dataset_id}.{table_id}")))
    }

    async fn run_query(&self, sql: &str) -> WarehouseResult<QueryResult> {
        match self.state.queries.get(&normalize_sql(sql)) {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(message)) => Err(WarehouseError::Api {
                status: 400,
                reason: Some("invalidQuery".to_string()),
                message: message.clone(),
            }),
            None => Err(WarehouseError::NotFound(format!("no canned result for query: {sql}"))),
        }
    }
}

fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
