//! Common types used across the HCA orchestration workspace

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// A kind of HCA metadata entity, one table per kind in the target dataset
/// (e.g. `cell_suspension`, `process`, `links`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataType(String);

impl MetadataType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary key column, `{type}_id` by convention.
    pub fn primary_key(&self) -> String {
        format!("{}_id", self.0)
    }
}

impl fmt::Display for MetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetadataType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque identifier of an asynchronous data repository job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully-qualified scratch BigQuery dataset, `{project}.{dataset}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScratchDatasetName(String);

impl ScratchDatasetName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dataset id without the project qualifier.
    pub fn dataset_id(&self) -> &str {
        self.0.rsplit_once('.').map_or(&self.0, |(_, dataset)| dataset)
    }
}

impl fmt::Display for ScratchDatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Run configuration
// ============================================================================

/// Intermediate staging location for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchConfig {
    pub scratch_bucket_name: String,
    pub scratch_prefix_name: String,
    pub scratch_bq_project: String,
    pub scratch_dataset_prefix: String,
    pub scratch_table_expiration_ms: u64,
}

impl ScratchConfig {
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        bq_project: impl Into<String>,
        dataset_prefix: impl Into<String>,
        table_expiration_ms: u64,
    ) -> Self {
        Self {
            scratch_bucket_name: bucket.into(),
            scratch_prefix_name: prefix.into(),
            scratch_bq_project: bq_project.into(),
            scratch_dataset_prefix: dataset_prefix.into(),
            scratch_table_expiration_ms: table_expiration_ms,
        }
    }

    /// `gs://{bucket}/{prefix}`
    pub fn scratch_area(&self) -> String {
        format!("gs://{}/{}", self.scratch_bucket_name, self.scratch_prefix_name)
    }

    /// Scratch dataset for a load tag, `{project}.{dataset_prefix}_{load_tag}`.
    pub fn dataset_name(&self, load_tag: &str) -> ScratchDatasetName {
        ScratchDatasetName::new(format!(
            "{}.{}_{}",
            self.scratch_bq_project, self.scratch_dataset_prefix, load_tag
        ))
    }
}

/// Destination TDR dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDataset {
    pub dataset_name: String,
    pub dataset_id: String,
    pub project_id: String,
    pub billing_profile_id: String,
    pub bq_location: String,
}

impl TargetDataset {
    pub fn new(
        dataset_name: impl Into<String>,
        dataset_id: impl Into<String>,
        project_id: impl Into<String>,
        billing_profile_id: impl Into<String>,
        bq_location: impl Into<String>,
    ) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            dataset_id: dataset_id.into(),
            project_id: project_id.into(),
            billing_profile_id: billing_profile_id.into(),
            bq_location: bq_location.into(),
        }
    }

    /// BigQuery dataset backing the TDR dataset.
    pub fn fully_qualified_jade_dataset_name(&self) -> String {
        format!("datarepo_{}", self.dataset_name)
    }

    /// `{project}.datarepo_{dataset}.{table}`
    pub fn table(&self, table_name: &str) -> String {
        format!(
            "{}.{}.{}",
            self.project_id,
            self.fully_qualified_jade_dataset_name(),
            table_name
        )
    }
}

/// One unit of work produced by the metadata fanout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTypeFanoutResult {
    pub scratch_dataset_name: ScratchDatasetName,
    pub metadata_type: MetadataType,
    pub path: String,
}

/// First eight characters of a run id, generating one when absent.
pub fn short_run_id(run_id: Option<&str>) -> String {
    let run_id = match run_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Uuid::new_v4().simple().to_string(),
    };
    run_id.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_convention() {
        assert_eq!(MetadataType::new("links").primary_key(), "links_id");
        assert_eq!(
            MetadataType::from("donor_organism").primary_key(),
            "donor_organism_id"
        );
    }

    #[test]
    fn test_scratch_names() {
        let scratch = ScratchConfig::new("bucket", "prefix", "bq_project", "dataset_prefix", 1);
        assert_eq!(scratch.scratch_area(), "gs://bucket/prefix");

        let dataset = scratch.dataset_name("abcd1234");
        assert_eq!(dataset.as_str(), "bq_project.dataset_prefix_abcd1234");
        assert_eq!(dataset.dataset_id(), "dataset_prefix_abcd1234");
    }

    #[test]
    fn test_target_table() {
        let target = TargetDataset::new("hca_dev", "1234abc", "tdr-project", "profile", "US");
        assert_eq!(target.fully_qualified_jade_dataset_name(), "datarepo_hca_dev");
        assert_eq!(target.table("process"), "tdr-project.datarepo_hca_dev.process");
    }

    #[test]
    fn test_short_run_id() {
        assert_eq!(short_run_id(Some("0123456789abcdef")), "01234567");
        assert_eq!(short_run_id(None).len(), 8);
        assert_eq!(short_run_id(Some("")).len(), 8);
    }
}
