//! BigQuery request/response shapes and the small value types the pipeline
//! passes around.

use hca_common::{types::ScratchDatasetName, HcaError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// One result row keyed by column name.
pub type Row = Map<String, Value>;

/// `{project}.{dataset}.{table}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    /// A table inside a fully-qualified scratch dataset.
    pub fn in_scratch(dataset: &ScratchDatasetName, table_id: impl Into<String>) -> Result<Self> {
        let (project, dataset_id) = dataset.as_str().split_once('.').ok_or_else(|| {
            HcaError::Parse(format!(
                "Scratch dataset '{}' is not project-qualified",
                dataset
            ))
        })?;
        Ok(Self::new(project, dataset_id, table_id))
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.qualified())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationFormat {
    #[default]
    NewlineDelimitedJson,
    Csv,
}

/// Files in object storage exposed to a query as a temporary table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSource {
    pub table_name: String,
    pub source_uris: Vec<String>,
}

/// A query whose result replaces the contents of `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryJob {
    pub query: String,
    /// Project billed for the query
    pub project: String,
    pub destination: TableRef,
    pub external_sources: Vec<ExternalSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParameter {
    String { name: String, value: String },
    StringArray { name: String, values: Vec<String> },
}

impl QueryParameter {
    pub fn string_array(name: impl Into<String>, values: Vec<String>) -> Self {
        Self::StringArray {
            name: name.into(),
            values,
        }
    }

    pub(crate) fn to_json(&self) -> Value {
        match self {
            QueryParameter::String { name, value } => json!({
                "name": name,
                "parameterType": { "type": "STRING" },
                "parameterValue": { "value": value },
            }),
            QueryParameter::StringArray { name, values } => json!({
                "name": name,
                "parameterType": { "type": "ARRAY", "arrayType": { "type": "STRING" } },
                "parameterValue": {
                    "arrayValues": values.iter().map(|v| json!({ "value": v })).collect::<Vec<_>>()
                },
            }),
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorProto {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobStatus {
    pub state: String,
    #[serde(default)]
    pub error_result: Option<ErrorProto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Job {
    pub job_reference: JobReference,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Table {
    #[serde(default)]
    pub num_rows: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Cell {
    #[serde(default)]
    pub v: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireRow {
    #[serde(default)]
    pub f: Vec<Cell>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub job_complete: bool,
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Vec<WireRow>,
    #[serde(default)]
    pub page_token: Option<String>,
}

pub(crate) fn external_table_definitions(sources: &[ExternalSource]) -> HashMap<String, Value> {
    sources
        .iter()
        .map(|source| {
            (
                source.table_name.clone(),
                json!({
                    "sourceUris": source.source_uris,
                    "sourceFormat": DestinationFormat::NewlineDelimitedJson,
                    "autodetect": true,
                }),
            )
        })
        .collect()
}

static NULL: Value = Value::Null;

/// Decode BigQuery's `{"f": [{"v": ...}]}` row encoding using the schema.
pub(crate) fn decode_row(fields: &[TableFieldSchema], row: &WireRow) -> Result<Row> {
    fields
        .iter()
        .zip(row.f.iter())
        .map(|(field, cell)| Ok((field.name.clone(), decode_field(field, &cell.v)?)))
        .collect()
}

fn decode_field(field: &TableFieldSchema, value: &Value) -> Result<Value> {
    if field.mode.as_deref() == Some("REPEATED") {
        return match value {
            Value::Array(items) => items
                .iter()
                .map(|item| decode_scalar_or_record(field, item.get("v").unwrap_or(&NULL)))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            _ => Ok(Value::Array(Vec::new())),
        };
    }
    decode_scalar_or_record(field, value)
}

fn decode_scalar_or_record(field: &TableFieldSchema, value: &Value) -> Result<Value> {
    let decoded = match (field.field_type.as_str(), value) {
        (_, Value::Null) => Value::Null,
        ("RECORD" | "STRUCT", Value::Object(_)) => {
            let nested: WireRow = serde_json::from_value(value.clone()).map_err(|e| {
                HcaError::Parse(format!("Malformed record in column {}: {}", field.name, e))
            })?;
            Value::Object(decode_row(&field.fields, &nested)?)
        },
        ("INTEGER" | "INT64", Value::String(s)) => {
            s.parse::<i64>().map(Value::from).unwrap_or_else(|_| value.clone())
        },
        ("FLOAT" | "FLOAT64", Value::String(s)) => {
            s.parse::<f64>().map(Value::from).unwrap_or_else(|_| value.clone())
        },
        ("BOOLEAN" | "BOOL", Value::String(s)) => Value::Bool(s.eq_ignore_ascii_case("true")),
        _ => value.clone(),
    };
    Ok(decoded)
}
