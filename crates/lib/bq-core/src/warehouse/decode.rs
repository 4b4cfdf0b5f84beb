//! Decoding of REST schema and row payloads.
//!
//! Rows arrive as `{"f": [{"v": ...}]}` with every scalar encoded as a
//! string; the result schema decides the JSON type each cell becomes.

use bq_store::models::{FieldMode, FieldSchema, QueryRow};
use chrono::{DateTime, SecondsFormat};
use serde::Deserialize;
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RestField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<RestField>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RestSchema {
    #[serde(default)]
    pub fields: Vec<RestField>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RestRow {
    #[serde(default)]
    pub f: Vec<RestCell>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RestCell {
    #[serde(default)]
    pub v: Value,
}

pub(crate) fn fields_from_rest(schema: RestSchema) -> Vec<FieldSchema> {
    schema.fields.into_iter().map(field_from_rest).collect()
}

fn field_from_rest(field: RestField) -> FieldSchema {
    FieldSchema {
        name: field.name,
        field_type: field.field_type.to_ascii_uppercase(),
        mode: FieldMode::parse(field.mode.as_deref()),
        description: field.description.filter(|value| !value.is_empty()),
        fields: field.fields.into_iter().map(field_from_rest).collect(),
    }
}

pub(crate) fn decode_rows(fields: &[FieldSchema], rows: Vec<RestRow>) -> Result<Vec<QueryRow>, String> {
    rows.into_iter()
        .map(|row| decode_record(fields, &row.f))
        .collect()
}

fn decode_record(fields: &[FieldSchema], cells: &[RestCell]) -> Result<QueryRow, String> {
    if cells.len() != fields.len() {
        return Err(format!(
            "row has {} cells but schema has {} fields",
            cells.len(),
            fields.len()
        ));
    }
    let mut row = Map::with_capacity(fields.len());
    for (field, cell) in fields.iter().zip(cells) {
        row.insert(field.name.clone(), decode_cell(field, &cell.v)?);
    }
    Ok(row)
}

fn decode_cell(field: &FieldSchema, value: &Value) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if field.mode == FieldMode::Repeated {
        let Value::Array(items) = value else {
            return Err(format!("field {} is repeated but value is not an array", field.name));
        };
        return items
            .iter()
            .map(|item| decode_single(field, item.get("v").unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    decode_single(field, value)
}

fn decode_single(field: &FieldSchema, value: &Value) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if matches!(field.field_type.as_str(), "RECORD" | "STRUCT") {
        let cells = value
            .get("f")
            .cloned()
            .ok_or_else(|| format!("field {} is a record without cells", field.name))?;
        let cells: Vec<RestCell> =
            serde_json::from_value(cells).map_err(|err| format!("field {}: {err}", field.name))?;
        return decode_record(&field.fields, &cells).map(Value::Object);
    }

    let Value::String(raw) = value else {
        return Err(format!("field {} has a non-string scalar", field.name));
    };
    let parsed = match field.field_type.as_str() {
        "INTEGER" | "INT64" => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|err| format!("field {}: {err}", field.name))?,
        "FLOAT" | "FLOAT64" => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or_else(|| Value::String(raw.clone()), Value::Number),
        "BOOLEAN" | "BOOL" => match raw.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => return Err(format!("field {}: invalid boolean {other}", field.name)),
        },
        "TIMESTAMP" => Value::String(decode_timestamp(raw).ok_or_else(|| {
            format!("field {}: invalid timestamp {raw}", field.name)
        })?),
        _ => Value::String(raw.clone()),
    };
    Ok(parsed)
}

/// Timestamps are requested as integer microseconds since the epoch.
fn decode_timestamp(raw: &str) -> Option<String> {
    let micros = raw.parse::<i64>().ok()?;
    DateTime::from_timestamp_micros(micros)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
