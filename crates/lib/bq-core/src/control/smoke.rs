use bq_store::models::{FieldSchema, QueryRow};
use bq_store::schema::SMOKE_TEST_QUERY;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::warehouse::Warehouse;

use super::{ControlError, WarehouseControlPlane};

/// Schema of the first table found in a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableDescription {
    pub table_id: String,
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmokeDatasetReport {
    pub dataset_id: String,
    pub tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub described: Option<TableDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub describe_error: Option<String>,
}

/// Outcome of exercising every operation once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SmokeReport {
    pub datasets: Vec<SmokeDatasetReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_rows: Option<Vec<QueryRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_error: Option<String>,
}

impl SmokeReport {
    /// True when no datasets were visible and nothing else ran.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty() && self.query_rows.is_none() && self.query_error.is_none()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.query_error.is_none()
            && self
                .datasets
                .iter()
                .all(|dataset| dataset.describe_error.is_none())
    }
}

impl<W: Warehouse> WarehouseControlPlane<W> {
    /// Lists datasets, lists each dataset's tables and describes the first,
    /// then runs a trivial query.
    ///
    /// Stops early with an empty report when no datasets are visible. Describe
    /// and query failures are recorded in the report; listing failures abort.
    ///
    /// # Errors
    /// Returns `ControlError` if listing datasets or tables fails.
    pub async fn run_smoke_test(&self) -> Result<SmokeReport, ControlError> {
        let datasets = self.list_datasets().await?;
        if datasets.is_empty() {
            warn!("no datasets visible, skipping remaining checks");
            return Ok(SmokeReport::default());
        }

        let mut report = SmokeReport::default();
        for dataset in datasets {
            let tables = self.list_tables(&dataset.dataset_id).await?;
            let mut entry = SmokeDatasetReport {
                dataset_id: dataset.dataset_id.clone(),
                tables: tables.iter().map(|table| table.table_id.clone()).collect(),
                described: None,
                describe_error: None,
            };

            if let Some(first) = tables.first() {
                match self.describe_table(&dataset.dataset_id, &first.table_id).await {
                    Ok(fields) => {
                        entry.described = Some(TableDescription {
                            table_id: first.table_id.clone(),
                            fields,
                        });
                    }
                    Err(err) => {
                        warn!(
                            dataset_id = %dataset.dataset_id,
                            table_id = %first.table_id,
                            error = %err,
                            "describe failed"
                        );
                        entry.describe_error = Some(err.to_string());
                    }
                }
            }
            report.datasets.push(entry);
        }

        match self.execute_query(SMOKE_TEST_QUERY).await {
            Ok(result) => report.query_rows = Some(result.rows),
            Err(err) => {
                warn!(error = %err, "smoke query failed");
                report.query_error = Some(err.to_string());
            }
        }

        info!(
            datasets = report.datasets.len(),
            success = report.is_success(),
            "smoke test finished"
        );
        Ok(report)
    }
}
