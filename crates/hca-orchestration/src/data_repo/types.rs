//! Data repository request and response models

use hca_common::types::JobId;
use serde::{Deserialize, Serialize};

/// Bulk table ingest from files in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub format: FileFormat,
    pub ignore_unknown_values: bool,
    pub max_bad_records: u32,
    pub path: String,
    pub table: String,
}

impl IngestRequest {
    /// Newline-delimited JSON with no tolerance for bad records.
    pub fn strict_json(table: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            format: FileFormat::Json,
            ignore_unknown_values: false,
            max_bad_records: 0,
            path: path.into(),
            table: table.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Format of files the data repository reads, for ingest and deletion alike.
pub enum FileFormat {
    Json,
    Csv,
}

/// Row deletion request, rows addressed by `datarepo_row_id` files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDeletionRequest {
    pub delete_type: DeleteType,
    pub spec_type: SpecType,
    pub tables: Vec<DataDeletionTable>,
}

impl DataDeletionRequest {
    /// Soft-delete the rows listed in a CSV of row ids.
    pub fn soft_from_csv(table_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            delete_type: DeleteType::Soft,
            spec_type: SpecType::GcsFile,
            tables: vec![DataDeletionTable {
                table_name: table_name.into(),
                gcs_file_spec: GcsFileSpec {
                    file_type: FileFormat::Csv,
                    path: path.into(),
                },
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteType {
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecType {
    GcsFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDeletionTable {
    pub table_name: String,
    pub gcs_file_spec: GcsFileSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsFileSpec {
    pub file_type: FileFormat,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Job as reported by the data repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobModel {
    pub id: JobId,
    #[serde(default)]
    pub description: Option<String>,
    pub job_status: JobStatus,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub submitted: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
}
