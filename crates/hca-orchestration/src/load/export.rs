//! Export of scratch tables to object storage for the data repository

use crate::bigquery::{DestinationFormat, QueryEngine, TableRef};
use hca_common::{
    types::{MetadataType, ScratchConfig, ScratchDatasetName},
    HcaError, Result,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Directory (under the scratch area) holding rows to ingest.
pub const NEW_ROWS_OPERATION: &str = "new-rows";

/// Directory (under the scratch area) holding row ids to soft-delete.
pub const OUTDATED_IDS_OPERATION: &str = "outdated-ids";

pub struct TableExporter {
    bigquery: Arc<dyn QueryEngine>,
    scratch: ScratchConfig,
    scratch_dataset: ScratchDatasetName,
}

impl TableExporter {
    pub fn new(
        bigquery: Arc<dyn QueryEngine>,
        scratch: ScratchConfig,
        scratch_dataset: ScratchDatasetName,
    ) -> Self {
        Self {
            bigquery,
            scratch,
            scratch_dataset,
        }
    }

    /// Sharded export location, `{scratch_area}/{operation}/{type}/*`.
    pub fn export_uri(&self, operation: &str, metadata_type: &MetadataType) -> String {
        format!(
            "{}/{}/{}/*",
            self.scratch.scratch_area(),
            operation,
            metadata_type
        )
    }

    /// Export `{type}{suffix}` and return its row count.
    ///
    /// An empty table is not extracted at all and yields 0.
    #[instrument(skip(self), fields(metadata_type = %metadata_type))]
    pub async fn export(
        &self,
        operation: &str,
        suffix: &str,
        metadata_type: &MetadataType,
        format: DestinationFormat,
    ) -> Result<u64> {
        if !suffix.starts_with('_') {
            return Err(HcaError::precondition(format!(
                "Export table suffix must start with '_', got '{}'",
                suffix
            )));
        }

        let source = TableRef::in_scratch(
            &self.scratch_dataset,
            format!("{}{}", metadata_type, suffix),
        )?;
        let destination = self.export_uri(operation, metadata_type);

        let num_rows = self.bigquery.num_rows(&source).await?;
        if num_rows == 0 {
            debug!(source = %source, "Nothing to export");
            return Ok(0);
        }

        info!(source = %source, destination = %destination, num_rows, "Exporting table");
        self.bigquery
            .extract_table(&source, &destination, format)
            .await?;

        Ok(num_rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{fakes, scratch_config, Fakes};

    fn exporter(fakes: &Fakes) -> TableExporter {
        TableExporter::new(
            fakes.bigquery.clone(),
            scratch_config(),
            ScratchDatasetName::new("scratch-project.hca_scratch_abcd1234"),
        )
    }

    #[tokio::test]
    async fn test_empty_table_is_not_extracted() {
        let fakes = fakes();
        let rows = exporter(&fakes)
            .export(
                NEW_ROWS_OPERATION,
                "_values",
                &MetadataType::new("process"),
                DestinationFormat::NewlineDelimitedJson,
            )
            .await
            .unwrap();

        assert_eq!(rows, 0);
        assert!(fakes.bigquery.extracts().is_empty());
    }

    #[tokio::test]
    async fn test_export_returns_row_count() {
        let fakes = fakes();
        fakes
            .bigquery
            .set_num_rows("scratch-project.hca_scratch_abcd1234.links_outdated_ids", 7);

        let rows = exporter(&fakes)
            .export(
                OUTDATED_IDS_OPERATION,
                "_outdated_ids",
                &MetadataType::new("links"),
                DestinationFormat::Csv,
            )
            .await
            .unwrap();

        assert_eq!(rows, 7);
        let extracts = fakes.bigquery.extracts();
        assert_eq!(extracts.len(), 1);
        assert_eq!(
            extracts[0].destination_uri,
            "gs://scratch-bucket/run-prefix/outdated-ids/links/*"
        );
        assert_eq!(extracts[0].format, DestinationFormat::Csv);
    }

    #[tokio::test]
    async fn test_suffix_must_start_with_underscore() {
        let fakes = fakes();
        let err = exporter(&fakes)
            .export(
                NEW_ROWS_OPERATION,
                "values",
                &MetadataType::new("process"),
                DestinationFormat::NewlineDelimitedJson,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HcaError::Precondition(_)));
        assert!(fakes.bigquery.extracts().is_empty());
    }
}
