//! Data repository (TDR) API access

use async_trait::async_trait;
use hca_common::{types::JobId, HcaError, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, instrument};

pub mod types;

pub use types::{DataDeletionRequest, IngestRequest, JobModel, JobStatus};

/// Default timeout for data repository requests in seconds.
pub const DEFAULT_DATA_REPO_TIMEOUT_SECS: u64 = 60;

#[async_trait]
pub trait DataRepoApi: Send + Sync {
    async fn ingest_dataset(&self, dataset_id: &str, request: &IngestRequest) -> Result<JobId>;

    async fn apply_dataset_data_deletion(
        &self,
        dataset_id: &str,
        request: &DataDeletionRequest,
    ) -> Result<JobId>;

    async fn retrieve_job(&self, job_id: &JobId) -> Result<JobModel>;

    /// Job-specific result body; its shape depends on the job type.
    async fn retrieve_job_result(&self, job_id: &JobId) -> Result<Value>;
}

pub struct DataRepoClient {
    client: Client,
    base_url: String,
    token: String,
}

impl DataRepoClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/repository/v1/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HcaError::api(status.as_u16(), body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl DataRepoApi for DataRepoClient {
    #[instrument(skip(self, request), fields(table = %request.table))]
    async fn ingest_dataset(&self, dataset_id: &str, request: &IngestRequest) -> Result<JobId> {
        let url = self.url(&format!("datasets/{}/ingest", dataset_id));
        let job: JobModel = self.send(self.client.post(url).json(request)).await?;

        info!(job_id = %job.id, path = %request.path, "Submitted table ingest");
        Ok(job.id)
    }

    #[instrument(skip(self, request))]
    async fn apply_dataset_data_deletion(
        &self,
        dataset_id: &str,
        request: &DataDeletionRequest,
    ) -> Result<JobId> {
        let url = self.url(&format!("datasets/{}/deletes", dataset_id));
        let job: JobModel = self.send(self.client.post(url).json(request)).await?;

        info!(job_id = %job.id, "Submitted soft deletion");
        Ok(job.id)
    }

    async fn retrieve_job(&self, job_id: &JobId) -> Result<JobModel> {
        let url = self.url(&format!("jobs/{}", job_id));
        self.send(self.client.get(url)).await
    }

    async fn retrieve_job_result(&self, job_id: &JobId) -> Result<Value> {
        let url = self.url(&format!("jobs/{}/result", job_id));
        self.send(self.client.get(url)).await
    }
}
