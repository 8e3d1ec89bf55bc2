//! Loading one metadata table
//!
//! [`LoadTableController`] runs the per-type load as a state machine:
//!
//! ```text
//! CheckData ─┬─> Done(NoData)
//!            └─> HasData ─> Loading ─┬─> Done(NoNewRows)
//!                                    └─> NewRowsSubmitted ─> AwaitLoad ─> CheckOutdated
//!
//! CheckOutdated ─┬─> Done(NoOutdated)
//!                └─> HasOutdated ─> DeleteSubmitted ─> AwaitDelete ─> Done(OutdatedDeleted)
//! ```
//!
//! Each step is also callable on its own. The steps that only make sense
//! after an earlier decision take that decision as input and reject the
//! negative case with a precondition error.

use crate::bigquery::DestinationFormat;
use crate::data_repo::{DataDeletionRequest, IngestRequest};
use crate::jobs::{CompletedJob, JobWaiter, ResultCheck};
use crate::load::diff::{RowDiffEngine, OUTDATED_IDS_SUFFIX, VALUES_SUFFIX};
use crate::load::export::{TableExporter, NEW_ROWS_OPERATION, OUTDATED_IDS_OPERATION};
use crate::load::Resources;
use chrono::{DateTime, Utc};
use hca_common::{
    types::{JobId, MetadataType, MetadataTypeFanoutResult},
    HcaError, Result,
};
use serde::Serialize;
use tracing::{info, instrument};

/// Whether the staging area holds anything for the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCheck {
    NoData,
    HasData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStart {
    /// The diff found nothing new; no ingest was submitted.
    NoNewRows,
    Submitted { job_id: JobId, new_rows: u64 },
}

/// Outdated rows exported after a completed load of one metadata type.
///
/// Only [`LoadTableController::check_has_outdated`] builds one, so holding it
/// means the load finished and the outdated export is non-empty.
///
/// ```compile_fail
/// use hca_orchestration::load::{OutdatedCheck, OutdatedRows};
///
/// let check = OutdatedCheck::HasOutdated(OutdatedRows { rows: 9 });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedRows {
    metadata_type: MetadataType,
    load: CompletedJob,
    rows: u64,
}

impl OutdatedRows {
    pub fn metadata_type(&self) -> &MetadataType {
        &self.metadata_type
    }

    pub fn load(&self) -> &CompletedJob {
        &self.load
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutdatedCheck {
    NoOutdated,
    HasOutdated(OutdatedRows),
}

/// Terminal result of a table load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    NoData,
    NoNewRows,
    NoOutdated {
        load_job: JobId,
        new_rows: u64,
    },
    OutdatedDeleted {
        load_job: JobId,
        delete_job: JobId,
        new_rows: u64,
        outdated_rows: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    CheckData,
    HasData,
    Loading,
    NewRowsSubmitted {
        job_id: JobId,
        new_rows: u64,
    },
    AwaitLoad {
        job_id: JobId,
        new_rows: u64,
    },
    CheckOutdated {
        load: CompletedJob,
        new_rows: u64,
    },
    HasOutdated {
        outdated: OutdatedRows,
        new_rows: u64,
    },
    DeleteSubmitted {
        outdated: OutdatedRows,
        delete_job: JobId,
        new_rows: u64,
    },
    AwaitDelete {
        outdated: OutdatedRows,
        delete_job: JobId,
        new_rows: u64,
    },
    Done(LoadOutcome),
}

impl LoadState {
    pub fn name(&self) -> &'static str {
        match self {
            LoadState::CheckData => "check_data",
            LoadState::HasData => "has_data",
            LoadState::Loading => "loading",
            LoadState::NewRowsSubmitted { .. } => "new_rows_submitted",
            LoadState::AwaitLoad { .. } => "await_load",
            LoadState::CheckOutdated { .. } => "check_outdated",
            LoadState::HasOutdated { .. } => "has_outdated",
            LoadState::DeleteSubmitted { .. } => "delete_submitted",
            LoadState::AwaitDelete { .. } => "await_delete",
            LoadState::Done(_) => "done",
        }
    }
}

/// Summary of one [`LoadTableController::run`].
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub metadata_type: MetadataType,
    pub outcome: LoadOutcome,
    /// State names in the order they were entered
    pub visited: Vec<&'static str>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl LoadReport {
    pub fn duration_secs(&self) -> f64 {
        (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

pub struct LoadTableController {
    resources: Resources,
    unit: MetadataTypeFanoutResult,
    diff: RowDiffEngine,
    exporter: TableExporter,
    waiter: JobWaiter,
}

impl LoadTableController {
    pub fn new(resources: Resources, unit: MetadataTypeFanoutResult) -> Self {
        let diff = RowDiffEngine::new(
            resources.bigquery.clone(),
            resources.scratch.clone(),
            resources.target.clone(),
            unit.scratch_dataset_name.clone(),
        );
        let exporter = TableExporter::new(
            resources.bigquery.clone(),
            resources.scratch.clone(),
            unit.scratch_dataset_name.clone(),
        );
        let waiter = resources.waiter();

        Self {
            resources,
            unit,
            diff,
            exporter,
            waiter,
        }
    }

    pub fn metadata_type(&self) -> &MetadataType {
        &self.unit.metadata_type
    }

    /// Probe `{scratch_prefix}/{path}/{type}/` for any non-empty object.
    #[instrument(skip(self), fields(metadata_type = %self.unit.metadata_type))]
    pub async fn check_has_data(&self) -> Result<DataCheck> {
        let scratch = &self.resources.scratch;
        let prefix = format!(
            "{}/{}/{}/",
            scratch.scratch_prefix_name, self.unit.path, self.unit.metadata_type
        );
        info!(bucket = %scratch.scratch_bucket_name, prefix = %prefix, "Checking for data to load");

        if self
            .resources
            .storage
            .has_any_data(&scratch.scratch_bucket_name, &prefix)
            .await?
        {
            info!("Staging area has data to load");
            Ok(DataCheck::HasData)
        } else {
            info!("Staging area has no data to load");
            Ok(DataCheck::NoData)
        }
    }

    /// Diff staged rows against the target, export the new ones and submit
    /// their ingest.
    #[instrument(skip(self), fields(metadata_type = %self.unit.metadata_type))]
    pub async fn start_load(&self, check: DataCheck) -> Result<LoadStart> {
        if check != DataCheck::HasData {
            return Err(HcaError::precondition(
                "Should not attempt to load data if no data is present",
            ));
        }

        let metadata_type = &self.unit.metadata_type;
        let joined = self.diff.diff_table(metadata_type, &self.unit.path).await?;
        self.diff.query_rows_to_append(metadata_type, &joined).await?;

        let new_rows = self
            .exporter
            .export(
                NEW_ROWS_OPERATION,
                VALUES_SUFFIX,
                metadata_type,
                DestinationFormat::NewlineDelimitedJson,
            )
            .await?;
        if new_rows == 0 {
            info!("No new rows to load");
            return Ok(LoadStart::NoNewRows);
        }

        let request = IngestRequest::strict_json(
            metadata_type.as_str(),
            self.exporter.export_uri(NEW_ROWS_OPERATION, metadata_type),
        );
        let job_id = self
            .resources
            .data_repo
            .ingest_dataset(&self.resources.target.dataset_id, &request)
            .await?;

        info!(new_rows, job_id = %job_id, "Submitted ingest of new rows");
        Ok(LoadStart::Submitted { job_id, new_rows })
    }

    /// Wait for the ingest and require that no row was rejected.
    pub async fn await_load(&self, job_id: &JobId) -> Result<CompletedJob> {
        self.waiter
            .wait_and_check(job_id, ResultCheck::TableIngest)
            .await
    }

    /// Find loaded rows superseded by a newer version and export their row ids.
    #[instrument(
        skip(self, load),
        fields(metadata_type = %self.unit.metadata_type, load_job = %load.job_id())
    )]
    pub async fn check_has_outdated(&self, load: &CompletedJob) -> Result<OutdatedCheck> {
        let metadata_type = &self.unit.metadata_type;
        self.diff.query_outdated_ids(metadata_type).await?;

        let rows = self
            .exporter
            .export(
                OUTDATED_IDS_OPERATION,
                OUTDATED_IDS_SUFFIX,
                metadata_type,
                DestinationFormat::Csv,
            )
            .await?;
        if rows == 0 {
            info!("No outdated rows");
            return Ok(OutdatedCheck::NoOutdated);
        }

        let scratch = &self.resources.scratch;
        let prefix = format!(
            "{}/{}/{}/",
            scratch.scratch_prefix_name, OUTDATED_IDS_OPERATION, metadata_type
        );
        if !self
            .resources
            .storage
            .has_any_data(&scratch.scratch_bucket_name, &prefix)
            .await?
        {
            return Err(HcaError::storage(format!(
                "{} outdated rows exported but nothing found under gs://{}/{}",
                rows, scratch.scratch_bucket_name, prefix
            )));
        }

        info!(outdated_rows = rows, "Found outdated rows");
        Ok(OutdatedCheck::HasOutdated(OutdatedRows {
            metadata_type: metadata_type.clone(),
            load: load.clone(),
            rows,
        }))
    }

    /// Submit the soft deletion of the exported outdated row ids.
    #[instrument(skip(self), fields(metadata_type = %self.unit.metadata_type))]
    pub async fn clear_outdated(&self, check: &OutdatedCheck) -> Result<JobId> {
        match check {
            OutdatedCheck::NoOutdated => Err(HcaError::precondition(
                "Should not attempt to clear outdated rows if none are present",
            )),
            OutdatedCheck::HasOutdated(outdated) => self.submit_deletion(outdated).await,
        }
    }

    async fn submit_deletion(&self, outdated: &OutdatedRows) -> Result<JobId> {
        let metadata_type = &self.unit.metadata_type;
        if outdated.metadata_type() != metadata_type {
            return Err(HcaError::precondition(format!(
                "Outdated rows of {} cannot be cleared from {}",
                outdated.metadata_type(),
                metadata_type
            )));
        }

        let request = DataDeletionRequest::soft_from_csv(
            metadata_type.as_str(),
            self.exporter.export_uri(OUTDATED_IDS_OPERATION, metadata_type),
        );
        let job_id = self
            .resources
            .data_repo
            .apply_dataset_data_deletion(&self.resources.target.dataset_id, &request)
            .await?;

        info!(
            job_id = %job_id,
            load_job = %outdated.load().job_id(),
            "Submitted soft deletion of outdated rows"
        );
        Ok(job_id)
    }

    /// Wait for the deletion and require that no file failed.
    pub async fn await_delete(&self, job_id: &JobId) -> Result<CompletedJob> {
        self.waiter
            .wait_and_check(job_id, ResultCheck::NoFailedFiles)
            .await
    }

    /// Advance the machine by one transition.
    pub async fn step(&self, state: LoadState) -> Result<LoadState> {
        let next = match state {
            LoadState::CheckData => match self.check_has_data().await? {
                DataCheck::NoData => LoadState::Done(LoadOutcome::NoData),
                DataCheck::HasData => LoadState::HasData,
            },
            LoadState::HasData => LoadState::Loading,
            LoadState::Loading => match self.start_load(DataCheck::HasData).await? {
                LoadStart::NoNewRows => LoadState::Done(LoadOutcome::NoNewRows),
                LoadStart::Submitted { job_id, new_rows } => {
                    LoadState::NewRowsSubmitted { job_id, new_rows }
                },
            },
            LoadState::NewRowsSubmitted { job_id, new_rows } => {
                LoadState::AwaitLoad { job_id, new_rows }
            },
            LoadState::AwaitLoad { job_id, new_rows } => LoadState::CheckOutdated {
                load: self.await_load(&job_id).await?,
                new_rows,
            },
            LoadState::CheckOutdated { load, new_rows } => {
                match self.check_has_outdated(&load).await? {
                    OutdatedCheck::NoOutdated => LoadState::Done(LoadOutcome::NoOutdated {
                        load_job: load.job_id().clone(),
                        new_rows,
                    }),
                    OutdatedCheck::HasOutdated(outdated) => {
                        LoadState::HasOutdated { outdated, new_rows }
                    },
                }
            },
            LoadState::HasOutdated { outdated, new_rows } => {
                let delete_job = self.submit_deletion(&outdated).await?;
                LoadState::DeleteSubmitted {
                    outdated,
                    delete_job,
                    new_rows,
                }
            },
            LoadState::DeleteSubmitted {
                outdated,
                delete_job,
                new_rows,
            } => LoadState::AwaitDelete {
                outdated,
                delete_job,
                new_rows,
            },
            LoadState::AwaitDelete {
                outdated,
                delete_job,
                new_rows,
            } => {
                self.await_delete(&delete_job).await?;
                LoadState::Done(LoadOutcome::OutdatedDeleted {
                    load_job: outdated.load().job_id().clone(),
                    delete_job,
                    new_rows,
                    outdated_rows: outdated.rows(),
                })
            },
            done @ LoadState::Done(_) => done,
        };
        Ok(next)
    }

    /// Step from `CheckData` to a terminal state.
    #[instrument(skip(self), fields(metadata_type = %self.unit.metadata_type))]
    pub async fn run(&self) -> Result<LoadReport> {
        let started_at = Utc::now();
        let mut visited = Vec::new();
        let mut state = LoadState::CheckData;

        let outcome = loop {
            visited.push(state.name());
            match state {
                LoadState::Done(outcome) => break outcome,
                current => state = self.step(current).await?,
            }
        };

        let report = LoadReport {
            metadata_type: self.unit.metadata_type.clone(),
            outcome,
            visited,
            started_at,
            completed_at: Utc::now(),
        };
        info!(
            outcome = ?report.outcome,
            duration_secs = report.duration_secs(),
            "Table load finished"
        );
        Ok(report)
    }
}
