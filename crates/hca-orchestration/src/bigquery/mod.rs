//! Tabular query engine access
//!
//! [`QueryEngine`] is the narrow surface the pipeline needs from BigQuery:
//! materialize a query into a table, extract a table to object storage,
//! count rows, run a read query, and create the scratch dataset.
//! [`BigQueryClient`] implements it over the BigQuery v2 REST API.

use async_trait::async_trait;
use hca_common::{HcaError, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

pub mod types;

pub use types::{DestinationFormat, ExternalSource, QueryJob, QueryParameter, Row, TableRef};

use types::{decode_row, external_table_definitions, Job, JobReference, QueryResponse, Table};

/// Default BigQuery REST root.
pub const DEFAULT_BIGQUERY_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// How often an in-flight BigQuery job is re-checked.
pub const DEFAULT_JOB_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Create `{project}.{dataset_id}` with a default table expiration.
    async fn create_dataset(
        &self,
        project: &str,
        dataset_id: &str,
        location: &str,
        default_table_expiration_ms: u64,
    ) -> Result<()>;

    /// Run `job.query` and overwrite `job.destination` with the result.
    async fn query_to_table(&self, job: &QueryJob) -> Result<()>;

    /// Export a table to `destination_uri` (may contain a `*` shard wildcard).
    async fn extract_table(
        &self,
        source: &TableRef,
        destination_uri: &str,
        format: DestinationFormat,
    ) -> Result<()>;

    async fn num_rows(&self, table: &TableRef) -> Result<u64>;

    /// Run a read-only query and collect every result row.
    async fn run_query(
        &self,
        query: &str,
        project: &str,
        location: &str,
        params: &[QueryParameter],
    ) -> Result<Vec<Row>>;
}

pub struct BigQueryClient {
    client: Client,
    base_url: String,
    token: String,
    poll_interval: Duration,
}

impl BigQueryClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            poll_interval: DEFAULT_JOB_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HcaError::api(status.as_u16(), body));
        }
        Ok(response.json().await?)
    }

    async fn post<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Submit a job and block until BigQuery reports it DONE.
    async fn run_job(&self, project: &str, configuration: Value) -> Result<()> {
        let url = format!("{}/projects/{}/jobs", self.base_url, project);
        let mut job: Job = self
            .post(&url, &json!({ "configuration": configuration }))
            .await?;

        while job.status.state != "DONE" {
            tokio::time::sleep(self.poll_interval).await;
            job = self.get_job(&job.job_reference).await?;
        }

        if let Some(error) = job.status.error_result {
            return Err(HcaError::query(format!(
                "BigQuery job {} failed ({}): {}",
                job.job_reference.job_id,
                error.reason.unwrap_or_default(),
                error.message.unwrap_or_default()
            )));
        }

        debug!(job_id = %job.job_reference.job_id, "BigQuery job done");
        Ok(())
    }

    async fn get_job(&self, reference: &JobReference) -> Result<Job> {
        let url = format!(
            "{}/projects/{}/jobs/{}",
            self.base_url, reference.project_id, reference.job_id
        );
        let location = reference.location.as_deref().unwrap_or_default();
        if location.is_empty() {
            self.get(&url, &[]).await
        } else {
            self.get(&url, &[("location", location)]).await
        }
    }
}

#[async_trait]
impl QueryEngine for BigQueryClient {
    #[instrument(skip(self))]
    async fn create_dataset(
        &self,
        project: &str,
        dataset_id: &str,
        location: &str,
        default_table_expiration_ms: u64,
    ) -> Result<()> {
        let url = format!("{}/projects/{}/datasets", self.base_url, project);
        let body = json!({
            "datasetReference": { "projectId": project, "datasetId": dataset_id },
            "location": location,
            "defaultTableExpirationMs": default_table_expiration_ms.to_string(),
        });
        let _: Value = self.post(&url, &body).await?;
        Ok(())
    }

    #[instrument(skip(self, job), fields(destination = %job.destination))]
    async fn query_to_table(&self, job: &QueryJob) -> Result<()> {
        let mut query = json!({
            "query": job.query,
            "useLegacySql": false,
            "destinationTable": job.destination,
            "writeDisposition": "WRITE_TRUNCATE",
        });
        if !job.external_sources.is_empty() {
            query["tableDefinitions"] = json!(external_table_definitions(&job.external_sources));
        }

        self.run_job(&job.project, json!({ "query": query })).await
    }

    #[instrument(skip(self))]
    async fn extract_table(
        &self,
        source: &TableRef,
        destination_uri: &str,
        format: DestinationFormat,
    ) -> Result<()> {
        let configuration = json!({
            "extract": {
                "sourceTable": source,
                "destinationUris": [destination_uri],
                "destinationFormat": format,
            }
        });
        self.run_job(&source.project_id, configuration).await
    }

    #[instrument(skip(self))]
    async fn num_rows(&self, table: &TableRef) -> Result<u64> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.base_url, table.project_id, table.dataset_id, table.table_id
        );
        let table_info: Table = self.get(&url, &[]).await?;

        match table_info.num_rows {
            Some(count) => count
                .parse()
                .map_err(|_| HcaError::Parse(format!("Invalid numRows '{}' for {}", count, table))),
            None => Ok(0),
        }
    }

    #[instrument(skip(self, query, params))]
    async fn run_query(
        &self,
        query: &str,
        project: &str,
        location: &str,
        params: &[QueryParameter],
    ) -> Result<Vec<Row>> {
        let url = format!("{}/projects/{}/queries", self.base_url, project);
        let mut body = json!({
            "query": query,
            "useLegacySql": false,
            "location": location,
        });
        if !params.is_empty() {
            body["parameterMode"] = json!("NAMED");
            body["queryParameters"] =
                Value::Array(params.iter().map(QueryParameter::to_json).collect());
        }

        let mut response: QueryResponse = self.post(&url, &body).await?;
        let mut rows = Vec::new();

        loop {
            if response.job_complete {
                let fields = response
                    .schema
                    .as_ref()
                    .map(|schema| schema.fields.as_slice())
                    .unwrap_or_default();
                for row in &response.rows {
                    rows.push(decode_row(fields, row)?);
                }

                if response.page_token.is_none() {
                    break;
                }
            } else {
                tokio::time::sleep(self.poll_interval).await;
            }

            let reference = response.job_reference.clone().ok_or_else(|| {
                HcaError::query("Incomplete query response without a job reference")
            })?;
            let results_url = format!(
                "{}/projects/{}/queries/{}",
                self.base_url, reference.project_id, reference.job_id
            );
            let mut query_args = vec![("location", location)];
            if let Some(token) = response.page_token.as_deref() {
                query_args.push(("pageToken", token));
            }
            let next: QueryResponse = self.get(&results_url, &query_args).await?;
            response = QueryResponse {
                job_reference: next.job_reference.or(Some(reference)),
                ..next
            };
        }

        debug!(num_rows = rows.len(), "Query returned rows");
        Ok(rows)
    }
}
