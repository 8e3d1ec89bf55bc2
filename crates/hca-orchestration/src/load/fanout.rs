//! One load per metadata type, several at a time

use crate::load::{LoadReport, LoadTableController, Resources};
use futures::stream::{self, StreamExt};
use hca_common::types::{MetadataType, MetadataTypeFanoutResult, ScratchDatasetName};
use serde::Serialize;
use tracing::{error, info};

/// Directory under the scratch area that holds staged metadata.
pub const DEFAULT_METADATA_PATH: &str = "metadata";

/// Every non-file metadata table of an HCA dataset.
pub const METADATA_TYPES: [&str; 22] = [
    "aggregate_generation_protocol",
    "analysis_process",
    "analysis_protocol",
    "cell_line",
    "cell_suspension",
    "collection_protocol",
    "differentiation_protocol",
    "dissociation_protocol",
    "donor_organism",
    "enrichment_protocol",
    "imaged_specimen",
    "imaging_preparation_protocol",
    "imaging_protocol",
    "ipsc_induction_protocol",
    "library_preparation_protocol",
    "organoid",
    "process",
    "project",
    "protocol",
    "sequencing_protocol",
    "specimen_from_organism",
    "links",
];

pub fn fanout(scratch_dataset: &ScratchDatasetName, path: &str) -> Vec<MetadataTypeFanoutResult> {
    METADATA_TYPES
        .iter()
        .map(|name| MetadataTypeFanoutResult {
            scratch_dataset_name: scratch_dataset.clone(),
            metadata_type: MetadataType::new(*name),
            path: path.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub metadata_type: MetadataType,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub reports: Vec<LoadReport>,
    pub failures: Vec<LoadFailure>,
}

impl LoadSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Load every unit, at most `concurrency` at once.
///
/// A failing type does not stop the others; its error lands in
/// [`LoadSummary::failures`].
pub async fn load_all(
    resources: &Resources,
    units: Vec<MetadataTypeFanoutResult>,
    concurrency: usize,
) -> LoadSummary {
    info!(types = units.len(), concurrency, "Loading metadata tables");

    let results: Vec<_> = stream::iter(units)
        .map(|unit| {
            let controller = LoadTableController::new(resources.clone(), unit);
            async move {
                let metadata_type = controller.metadata_type().clone();
                (metadata_type, controller.run().await)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut summary = LoadSummary::default();
    for (metadata_type, result) in results {
        match result {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                error!(metadata_type = %metadata_type, error = %e, "Table load failed");
                summary.failures.push(LoadFailure {
                    metadata_type,
                    error: e.to_string(),
                });
            },
        }
    }
    summary.reports.sort_by(|a, b| a.metadata_type.cmp(&b.metadata_type));
    summary.failures.sort_by(|a, b| a.metadata_type.cmp(&b.metadata_type));

    info!(
        succeeded = summary.reports.len(),
        failed = summary.failures.len(),
        "Metadata load finished"
    );
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::load::LoadOutcome;
    use crate::testing::fakes;
    use hca_common::HcaError;

    #[test]
    fn test_fanout_covers_every_type_once() {
        let dataset = ScratchDatasetName::new("scratch-project.hca_scratch_abcd1234");
        let units = fanout(&dataset, DEFAULT_METADATA_PATH);

        assert_eq!(units.len(), 22);
        assert!(units.iter().all(|unit| unit.path == "metadata"));
        assert!(units.iter().all(|unit| unit.scratch_dataset_name == dataset));
        assert!(units
            .iter()
            .any(|unit| unit.metadata_type == MetadataType::new("links")));
    }

    #[tokio::test]
    async fn test_load_all_reports_each_type() {
        let fakes = fakes();
        fakes.storage.put(
            "scratch-bucket",
            "run-prefix/metadata/process/part-000.json",
            "{}",
        );
        let dataset = ScratchDatasetName::new("scratch-project.hca_scratch_abcd1234");

        let summary = load_all(&fakes.resources, fanout(&dataset, "metadata"), 4).await;

        assert!(summary.is_success());
        assert_eq!(summary.reports.len(), 22);
        let process = summary
            .reports
            .iter()
            .find(|report| report.metadata_type.as_str() == "process")
            .unwrap();
        assert_eq!(process.outcome, LoadOutcome::NoNewRows);
        assert_eq!(
            summary
                .reports
                .iter()
                .filter(|report| report.outcome == LoadOutcome::NoData)
                .count(),
            21
        );
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_type() {
        let fakes = fakes();
        fakes.storage.put(
            "scratch-bucket",
            "run-prefix/metadata/process/part-000.json",
            "{}",
        );
        fakes.bigquery.set_num_rows(
            "scratch-project.hca_scratch_abcd1234.process_values",
            1,
        );
        fakes
            .data_repo
            .push_status_error(HcaError::api(403, "forbidden"));
        let dataset = ScratchDatasetName::new("scratch-project.hca_scratch_abcd1234");

        let summary = load_all(&fakes.resources, fanout(&dataset, "metadata"), 2).await;

        assert!(!summary.is_success());
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].metadata_type.as_str(), "process");
        assert_eq!(summary.reports.len(), 21);
    }
}
