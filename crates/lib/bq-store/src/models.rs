use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single result row keyed by column name.
pub type QueryRow = Map<String, Value>;

/// Dataset metadata as listed by the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetSummary {
    pub project_id: String,
    pub dataset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl DatasetSummary {
    #[must_use]
    pub fn new(project_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            location: None,
            friendly_name: None,
            labels: BTreeMap::new(),
        }
    }
}

/// Table metadata as listed within a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSummary {
    pub dataset_id: String,
    pub table_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl TableSummary {
    #[must_use]
    pub fn new(dataset_id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
            table_type: None,
            created_at: None,
        }
    }

    /// Returns the `dataset.table` form of this table's name.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        crate::schema::make_table_name(&self.dataset_id, &self.table_id)
    }
}

/// Column nullability and repetition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

impl FieldMode {
    /// Parses the warehouse's mode string; unknown or missing modes are nullable.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_uppercase).as_deref() {
            Some("REQUIRED") => Self::Required,
            Some("REPEATED") => Self::Repeated,
            _ => Self::Nullable,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nullable => "NULLABLE",
            Self::Required => "REQUIRED",
            Self::Repeated => "REPEATED",
        }
    }
}

/// One column of a table schema. RECORD columns carry nested fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub mode: FieldMode,
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            mode: FieldMode::Nullable,
            description: None,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Vec<Self>) -> Self {
        self.fields = fields;
        self
    }
}

/// Full table metadata including the ordered field list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub dataset_id: String,
    pub table_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    #[must_use]
    pub fn new(
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
        fields: Vec<FieldSchema>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
            description: None,
            num_rows: None,
            created_at: None,
            fields,
        }
    }

    #[must_use]
    pub fn summary(&self) -> TableSummary {
        TableSummary {
            dataset_id: self.dataset_id.clone(),
            table_id: self.table_id.clone(),
            table_type: None,
            created_at: self.created_at,
        }
    }
}

/// Rows produced by a single query execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub fields: Vec<FieldSchema>,
    pub rows: Vec<QueryRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
}

impl QueryResult {
    #[must_use]
    pub const fn new(fields: Vec<FieldSchema>, rows: Vec<QueryRow>) -> Self {
        Self {
            job_id: None,
            fields,
            rows,
            total_rows: None,
        }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_mode_parse_defaults_to_nullable() {
        assert_eq!(FieldMode::parse(None), FieldMode::Nullable);
        assert_eq!(FieldMode::parse(Some("repeated")), FieldMode::Repeated);
        assert_eq!(FieldMode::parse(Some("REQUIRED")), FieldMode::Required);
        assert_eq!(FieldMode::parse(Some("whatever")), FieldMode::Nullable);
    }

    #[test]
    fn field_schema_serializes_with_type_key() {
        let field = FieldSchema::new("id", "INTEGER")
            .with_mode(FieldMode::Required)
            .with_description("primary key");
        let value = serde_json::to_value(&field).expect("serialize field");

        assert_eq!(value["name"], "id");
        assert_eq!(value["type"], "INTEGER");
        assert_eq!(value["mode"], "REQUIRED");
        assert_eq!(value["description"], "primary key");
        assert!(value.get("fields").is_none());
    }
}
