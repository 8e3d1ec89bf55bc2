//! Staged-versus-loaded row diffing for one metadata type
//!
//! Every query materializes into a table of the run's scratch dataset named
//! after the metadata type, so concurrent types and runs never share a table.

use crate::bigquery::{ExternalSource, QueryEngine, QueryJob, TableRef};
use hca_common::{
    types::{MetadataType, ScratchConfig, ScratchDatasetName, TargetDataset},
    Result,
};
use std::sync::Arc;
use tracing::{info, instrument};

pub const JOINED_SUFFIX: &str = "_joined";
pub const VALUES_SUFFIX: &str = "_values";
pub const OUTDATED_IDS_SUFFIX: &str = "_outdated_ids";

/// Full outer join of staged rows against the target table on the primary key.
pub fn diff_query(metadata_type: &MetadataType, target: &TargetDataset) -> String {
    let pk = metadata_type.primary_key();
    format!(
        "SELECT J.datarepo_row_id, S.*, {pk} AS datarepo_{pk}\n\
         FROM {ty} S FULL JOIN `{target_table}` J\n\
         USING ({pk})",
        pk = pk,
        ty = metadata_type,
        target_table = target.table(metadata_type.as_str()),
    )
}

/// Joined rows with no loaded counterpart, helper columns dropped.
pub fn rows_to_append_query(metadata_type: &MetadataType, joined: &TableRef) -> String {
    let pk = metadata_type.primary_key();
    format!(
        "SELECT * EXCEPT (datarepo_{pk}, datarepo_row_id)\n\
         FROM `{joined}`\n\
         WHERE datarepo_row_id IS NULL AND {pk} IS NOT NULL",
        pk = pk,
        joined = joined,
    )
}

/// Row ids of loaded rows superseded by a higher version of the same key.
pub fn outdated_ids_query(metadata_type: &MetadataType, target: &TargetDataset) -> String {
    let pk = metadata_type.primary_key();
    format!(
        "WITH latest_versions AS (\n\
         \x20   SELECT {pk}, MAX(version) AS latest_version\n\
         \x20   FROM `{table}` GROUP BY {pk}\n\
         )\n\
         SELECT J.datarepo_row_id\n\
         FROM `{table}` J JOIN latest_versions L\n\
         ON J.{pk} = L.{pk}\n\
         WHERE J.version < L.latest_version",
        pk = pk,
        table = target.table(metadata_type.as_str()),
    )
}

pub struct RowDiffEngine {
    bigquery: Arc<dyn QueryEngine>,
    scratch: ScratchConfig,
    target: TargetDataset,
    scratch_dataset: ScratchDatasetName,
}

impl RowDiffEngine {
    pub fn new(
        bigquery: Arc<dyn QueryEngine>,
        scratch: ScratchConfig,
        target: TargetDataset,
        scratch_dataset: ScratchDatasetName,
    ) -> Self {
        Self {
            bigquery,
            scratch,
            target,
            scratch_dataset,
        }
    }

    /// Scratch table `{type}{suffix}`.
    pub fn scratch_table(&self, metadata_type: &MetadataType, suffix: &str) -> Result<TableRef> {
        TableRef::in_scratch(
            &self.scratch_dataset,
            format!("{}{}", metadata_type, suffix),
        )
    }

    /// Join the staged files under `{scratch_area}/{path}/{type}/` with the
    /// loaded table into `{type}_joined`.
    #[instrument(skip(self), fields(metadata_type = %metadata_type))]
    pub async fn diff_table(&self, metadata_type: &MetadataType, path: &str) -> Result<TableRef> {
        let destination = self.scratch_table(metadata_type, JOINED_SUFFIX)?;
        let source_uri = format!(
            "{}/{}/{}/*",
            self.scratch.scratch_area(),
            path,
            metadata_type
        );

        info!(
            source = %source_uri,
            destination = %destination,
            "Diffing staged rows against target"
        );
        self.bigquery
            .query_to_table(&QueryJob {
                query: diff_query(metadata_type, &self.target),
                project: self.scratch.scratch_bq_project.clone(),
                destination: destination.clone(),
                external_sources: vec![ExternalSource {
                    table_name: metadata_type.to_string(),
                    source_uris: vec![source_uri],
                }],
            })
            .await?;

        Ok(destination)
    }

    /// Materialize the new rows of `joined` into `{type}_values`.
    #[instrument(skip(self, joined), fields(metadata_type = %metadata_type))]
    pub async fn query_rows_to_append(
        &self,
        metadata_type: &MetadataType,
        joined: &TableRef,
    ) -> Result<TableRef> {
        let destination = self.scratch_table(metadata_type, VALUES_SUFFIX)?;
        self.bigquery
            .query_to_table(&QueryJob {
                query: rows_to_append_query(metadata_type, joined),
                project: self.scratch.scratch_bq_project.clone(),
                destination: destination.clone(),
                external_sources: Vec::new(),
            })
            .await?;

        Ok(destination)
    }

    /// Materialize the row ids of outdated loaded rows into `{type}_outdated_ids`.
    #[instrument(skip(self), fields(metadata_type = %metadata_type))]
    pub async fn query_outdated_ids(&self, metadata_type: &MetadataType) -> Result<TableRef> {
        let destination = self.scratch_table(metadata_type, OUTDATED_IDS_SUFFIX)?;
        self.bigquery
            .query_to_table(&QueryJob {
                query: outdated_ids_query(metadata_type, &self.target),
                project: self.scratch.scratch_bq_project.clone(),
                destination: destination.clone(),
                external_sources: Vec::new(),
            })
            .await?;

        Ok(destination)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{fakes, scratch_config, target_dataset};

    fn engine(fakes: &crate::testing::Fakes) -> RowDiffEngine {
        RowDiffEngine::new(
            fakes.bigquery.clone(),
            scratch_config(),
            target_dataset(),
            ScratchDatasetName::new("scratch-project.hca_scratch_abcd1234"),
        )
    }

    #[test]
    fn test_diff_query_joins_on_primary_key() {
        let query = diff_query(&MetadataType::new("process"), &target_dataset());
        assert!(query.contains("SELECT J.datarepo_row_id, S.*, process_id AS datarepo_process_id"));
        assert!(
            query.contains("FROM process S FULL JOIN `tdr-project.datarepo_hca_dev.process` J")
        );
        assert!(query.contains("USING (process_id)"));
    }

    #[test]
    fn test_rows_to_append_filters_loaded_and_null_keys() {
        let joined = TableRef::new("p", "d", "links_joined");
        let query = rows_to_append_query(&MetadataType::new("links"), &joined);
        assert!(query.contains("EXCEPT (datarepo_links_id, datarepo_row_id)"));
        assert!(query.contains("FROM `p.d.links_joined`"));
        assert!(query.contains("WHERE datarepo_row_id IS NULL AND links_id IS NOT NULL"));
    }

    #[test]
    fn test_outdated_query_compares_against_max_version() {
        let query = outdated_ids_query(&MetadataType::new("project"), &target_dataset());
        assert!(query.contains("SELECT project_id, MAX(version) AS latest_version"));
        assert!(query.contains("GROUP BY project_id"));
        assert!(query.contains("WHERE J.version < L.latest_version"));
    }

    #[tokio::test]
    async fn test_diff_table_reads_staged_files_as_external_table() {
        let fakes = fakes();
        let metadata_type = MetadataType::new("process");

        let joined = engine(&fakes).diff_table(&metadata_type, "metadata").await.unwrap();
        assert_eq!(joined.qualified(), "scratch-project.hca_scratch_abcd1234.process_joined");

        let queries = fakes.bigquery.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].project, "scratch-project");
        assert_eq!(queries[0].external_sources[0].table_name, "process");
        assert_eq!(
            queries[0].external_sources[0].source_uris,
            vec!["gs://scratch-bucket/run-prefix/metadata/process/*".to_string()]
        );
    }

    #[tokio::test]
    async fn test_tables_are_scoped_per_type() {
        let fakes = fakes();
        let engine = engine(&fakes);

        let a = engine.query_outdated_ids(&MetadataType::new("process")).await.unwrap();
        let b = engine.query_outdated_ids(&MetadataType::new("links")).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(b.table_id, "links_outdated_ids");
    }
}
