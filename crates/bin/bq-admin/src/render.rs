use std::fmt::Write as _;

use bq_core::control::SmokeReport;
use bq_store::models::{DatasetSummary, TableSummary};
use bq_store::schema::make_table_name;
use serde::Serialize;

pub fn dataset_list(datasets: &[DatasetSummary], filter: Option<&str>) -> String {
    if datasets.is_empty() {
        return filter.map_or_else(
            || "No datasets found in project.".to_string(),
            |filter| format!("No datasets found matching filter: {filter}"),
        );
    }
    let mut out = format!("Found {} datasets:", datasets.len());
    for dataset in datasets {
        let _ = write!(out, "\n- {}", dataset.dataset_id);
    }
    out
}

pub fn table_list<T: AsRef<str>>(dataset_id: &str, table_ids: &[T]) -> String {
    if table_ids.is_empty() {
        return format!("No tables found in dataset {dataset_id}.");
    }
    let mut out = format!("Found {} tables:", table_ids.len());
    for table_id in table_ids {
        let _ = write!(out, "\n- {}", table_id.as_ref());
    }
    out
}

pub fn table_ids(tables: &[TableSummary]) -> Vec<&str> {
    tables.iter().map(|table| table.table_id.as_str()).collect()
}

pub fn pretty_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

pub fn smoke_report(report: &SmokeReport) -> Result<String, serde_json::Error> {
    if report.is_empty() {
        return Ok("No datasets found; skipping remaining checks.".to_string());
    }

    let mut out = String::new();
    for dataset in &report.datasets {
        let _ = writeln!(out, "Dataset {}:", dataset.dataset_id);
        let _ = writeln!(out, "{}", table_list(&dataset.dataset_id, &dataset.tables));
        if let Some(described) = &dataset.described {
            let _ = writeln!(
                out,
                "Schema for {}:",
                make_table_name(&dataset.dataset_id, &described.table_id)
            );
            let _ = writeln!(out, "{}", pretty_json(&described.fields)?);
        }
        if let Some(error) = &dataset.describe_error {
            let _ = writeln!(out, "Error describing table: {error}");
        }
        out.push('\n');
    }

    match (&report.query_rows, &report.query_error) {
        (Some(rows), _) => {
            let _ = writeln!(out, "Query results:");
            let _ = writeln!(out, "{}", pretty_json(rows)?);
        }
        (None, Some(error)) => {
            let _ = writeln!(out, "Error executing query: {error}");
        }
        (None, None) => {}
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bq_core::control::{SmokeDatasetReport, TableDescription};
    use bq_store::models::FieldSchema;
    use serde_json::{Map, json};

    #[test]
    fn dataset_list_mentions_filter_when_empty() {
        assert_eq!(dataset_list(&[], None), "No datasets found in project.");
        assert_eq!(
            dataset_list(&[], Some("sales")),
            "No datasets found matching filter: sales"
        );
        let datasets = vec![
            DatasetSummary::new("acme", "sales"),
            DatasetSummary::new("acme", "staging"),
        ];
        assert_eq!(
            dataset_list(&datasets, None),
            "Found 2 datasets:\n- sales\n- staging"
        );
    }

    #[test]
    fn smoke_report_lists_schema_and_rows() {
        let mut row = Map::new();
        row.insert("test".to_string(), json!(1));
        let report = SmokeReport {
            datasets: vec![SmokeDatasetReport {
                dataset_id: "sales".to_string(),
                tables: vec!["orders".to_string()],
                described: Some(TableDescription {
                    table_id: "orders".to_string(),
                    fields: vec![FieldSchema::new("id", "INTEGER")],
                }),
                describe_error: None,
            }],
            query_rows: Some(vec![row]),
            query_error: None,
        };
        let text = smoke_report(&report).expect("render");
        assert!(text.contains("Found 1 tables:\n- orders"));
        assert!(text.contains("Schema for sales.orders:"));
        assert!(text.contains("\"name\": \"id\""));
        assert!(text.contains("Query results:"));
        assert!(text.contains("\"test\": 1"));
    }
}
