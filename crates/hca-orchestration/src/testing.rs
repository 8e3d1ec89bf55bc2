//! In-memory stand-ins for the service traits, recording every call.

#![allow(clippy::unwrap_used)]

use crate::bigquery::{DestinationFormat, QueryEngine, QueryJob, QueryParameter, Row, TableRef};
use crate::data_repo::{DataDeletionRequest, DataRepoApi, IngestRequest, JobModel, JobStatus};
use crate::jobs::WaitConfig;
use crate::load::Resources;
use crate::storage::{ObjectInfo, ObjectStore};
use async_trait::async_trait;
use hca_common::{
    types::{JobId, ScratchConfig, TargetDataset},
    HcaError, Result,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Object storage
// ============================================================================

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<BTreeMap<(String, String), (i64, String)>>,
    deleted: Mutex<Vec<String>>,
    list_calls: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub fn put(&self, bucket: &str, key: &str, content: &str) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (content.len() as i64, content.to_string()),
        );
    }

    /// An object with a reported size but no readable content.
    pub fn put_sized(&self, bucket: &str, key: &str, size: i64) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), (size, String::new()));
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Prefixes passed to `list_objects`, in call order.
    pub fn listed_prefixes(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeStorage {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.list_calls.lock().unwrap().push(prefix.to_string());
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, key), _)| b == bucket && key.starts_with(prefix))
            .map(|((_, key), (size, _))| ObjectInfo {
                key: key.clone(),
                size: *size,
            })
            .collect())
    }

    async fn read_text(&self, bucket: &str, key: &str) -> Result<String> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(_, content)| content.clone())
            .ok_or_else(|| HcaError::storage(format!("No such object gs://{}/{}", bucket, key)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

// ============================================================================
// Query engine
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractCall {
    pub source: TableRef,
    pub destination_uri: String,
    pub format: DestinationFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunQueryCall {
    pub query: String,
    pub project: String,
    pub params: Vec<QueryParameter>,
}

#[derive(Default)]
pub struct FakeQueryEngine {
    row_counts: Mutex<HashMap<String, u64>>,
    query_results: Mutex<VecDeque<Vec<Row>>>,
    queries: Mutex<Vec<QueryJob>>,
    extracts: Mutex<Vec<ExtractCall>>,
    run_queries: Mutex<Vec<RunQueryCall>>,
    datasets: Mutex<Vec<(String, String, String, u64)>>,
}

impl FakeQueryEngine {
    /// Row count reported for a table, keyed by its qualified name.
    pub fn set_num_rows(&self, table: &str, rows: u64) {
        self.row_counts
            .lock()
            .unwrap()
            .insert(table.to_string(), rows);
    }

    /// Rows returned by the next `run_query` call. Calls beyond the queue get no rows.
    pub fn push_query_result(&self, rows: Vec<Row>) {
        self.query_results.lock().unwrap().push_back(rows);
    }

    pub fn queries(&self) -> Vec<QueryJob> {
        self.queries.lock().unwrap().clone()
    }

    pub fn extracts(&self) -> Vec<ExtractCall> {
        self.extracts.lock().unwrap().clone()
    }

    pub fn run_queries(&self) -> Vec<RunQueryCall> {
        self.run_queries.lock().unwrap().clone()
    }

    pub fn datasets(&self) -> Vec<(String, String, String, u64)> {
        self.datasets.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryEngine for FakeQueryEngine {
    async fn create_dataset(
        &self,
        project: &str,
        dataset_id: &str,
        location: &str,
        default_table_expiration_ms: u64,
    ) -> Result<()> {
        self.datasets.lock().unwrap().push((
            project.to_string(),
            dataset_id.to_string(),
            location.to_string(),
            default_table_expiration_ms,
        ));
        Ok(())
    }

    async fn query_to_table(&self, job: &QueryJob) -> Result<()> {
        self.queries.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn extract_table(
        &self,
        source: &TableRef,
        destination_uri: &str,
        format: DestinationFormat,
    ) -> Result<()> {
        self.extracts.lock().unwrap().push(ExtractCall {
            source: source.clone(),
            destination_uri: destination_uri.to_string(),
            format,
        });
        Ok(())
    }

    async fn num_rows(&self, table: &TableRef) -> Result<u64> {
        Ok(self
            .row_counts
            .lock()
            .unwrap()
            .get(&table.qualified())
            .copied()
            .unwrap_or(0))
    }

    async fn run_query(
        &self,
        query: &str,
        project: &str,
        _location: &str,
        params: &[QueryParameter],
    ) -> Result<Vec<Row>> {
        self.run_queries.lock().unwrap().push(RunQueryCall {
            query: query.to_string(),
            project: project.to_string(),
            params: params.to_vec(),
        });
        Ok(self
            .query_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

// ============================================================================
// Data repository
// ============================================================================

pub struct FakeDataRepo {
    statuses: Mutex<VecDeque<Result<JobStatus>>>,
    fallback_status: Mutex<JobStatus>,
    results: Mutex<VecDeque<Result<Value>>>,
    ingests: Mutex<Vec<(String, IngestRequest)>>,
    deletions: Mutex<Vec<(String, DataDeletionRequest)>>,
    retrieve_job_calls: Mutex<Vec<JobId>>,
}

impl Default for FakeDataRepo {
    fn default() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            fallback_status: Mutex::new(JobStatus::Succeeded),
            results: Mutex::new(VecDeque::new()),
            ingests: Mutex::new(Vec::new()),
            deletions: Mutex::new(Vec::new()),
            retrieve_job_calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeDataRepo {
    pub fn push_statuses(&self, statuses: impl IntoIterator<Item = JobStatus>) {
        self.statuses
            .lock()
            .unwrap()
            .extend(statuses.into_iter().map(Ok));
    }

    pub fn push_status_error(&self, err: HcaError) {
        self.statuses.lock().unwrap().push_back(Err(err));
    }

    /// Status reported once the queued statuses run out.
    pub fn set_fallback_status(&self, status: JobStatus) {
        *self.fallback_status.lock().unwrap() = status;
    }

    /// Queued job results; an empty queue yields `{}`.
    pub fn push_results(&self, results: impl IntoIterator<Item = Value>) {
        self.results
            .lock()
            .unwrap()
            .extend(results.into_iter().map(Ok));
    }

    pub fn push_result_error(&self, err: HcaError) {
        self.results.lock().unwrap().push_back(Err(err));
    }

    pub fn ingests(&self) -> Vec<(String, IngestRequest)> {
        self.ingests.lock().unwrap().clone()
    }

    pub fn deletions(&self) -> Vec<(String, DataDeletionRequest)> {
        self.deletions.lock().unwrap().clone()
    }

    /// Queued results not yet handed out.
    pub fn pending_results(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    pub fn retrieve_job_calls(&self) -> usize {
        self.retrieve_job_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DataRepoApi for FakeDataRepo {
    async fn ingest_dataset(&self, dataset_id: &str, request: &IngestRequest) -> Result<JobId> {
        let mut ingests = self.ingests.lock().unwrap();
        ingests.push((dataset_id.to_string(), request.clone()));
        Ok(JobId::new(format!("ingest-{}", ingests.len())))
    }

    async fn apply_dataset_data_deletion(
        &self,
        dataset_id: &str,
        request: &DataDeletionRequest,
    ) -> Result<JobId> {
        let mut deletions = self.deletions.lock().unwrap();
        deletions.push((dataset_id.to_string(), request.clone()));
        Ok(JobId::new(format!("delete-{}", deletions.len())))
    }

    async fn retrieve_job(&self, job_id: &JobId) -> Result<JobModel> {
        self.retrieve_job_calls.lock().unwrap().push(job_id.clone());
        let status = match self.statuses.lock().unwrap().pop_front() {
            Some(status) => status?,
            None => *self.fallback_status.lock().unwrap(),
        };
        Ok(JobModel {
            id: job_id.clone(),
            description: None,
            job_status: status,
            status_code: None,
            submitted: None,
            completed: status.is_terminal().then(|| "2001-01-01T00:00:00Z".to_string()),
        })
    }

    async fn retrieve_job_result(&self, _job_id: &JobId) -> Result<Value> {
        match self.results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(json!({})),
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Fakes {
    pub storage: Arc<FakeStorage>,
    pub bigquery: Arc<FakeQueryEngine>,
    pub data_repo: Arc<FakeDataRepo>,
    pub resources: Resources,
}

pub fn scratch_config() -> ScratchConfig {
    ScratchConfig::new(
        "scratch-bucket",
        "run-prefix",
        "scratch-project",
        "hca_scratch",
        3_600_000,
    )
}

pub fn target_dataset() -> TargetDataset {
    TargetDataset::new("hca_dev", "dataset-uuid", "tdr-project", "profile-uuid", "US")
}

/// Fakes behind a `Resources` with an instant-poll waiter.
pub fn fakes() -> Fakes {
    let storage = Arc::new(FakeStorage::default());
    let bigquery = Arc::new(FakeQueryEngine::default());
    let data_repo = Arc::new(FakeDataRepo::default());

    let resources = Resources {
        storage: storage.clone(),
        bigquery: bigquery.clone(),
        data_repo: data_repo.clone(),
        scratch: scratch_config(),
        target: target_dataset(),
        wait: WaitConfig::new(Duration::ZERO, Duration::from_secs(10)),
    };

    Fakes {
        storage,
        bigquery,
        data_repo,
        resources,
    }
}
