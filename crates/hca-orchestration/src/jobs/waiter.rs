//! Poll a data repository job until it reaches a terminal state

use crate::data_repo::{DataRepoApi, JobStatus};
use crate::jobs::ResultCheck;
use hca_common::{types::JobId, HcaError, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Default delay between two status polls in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default wall-clock budget for one job in seconds.
pub const DEFAULT_MAX_WAIT_TIME_SECS: u64 = 7200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub max_wait_time: Duration,
}

impl WaitConfig {
    pub fn new(poll_interval: Duration, max_wait_time: Duration) -> Self {
        Self {
            poll_interval,
            max_wait_time,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            Duration::from_secs(DEFAULT_MAX_WAIT_TIME_SECS),
        )
    }
}

/// A job the waiter observed reach `succeeded`.
///
/// Only [`JobWaiter::wait_for_job`] hands these out, so holding one is proof
/// that the job finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedJob(JobId);

impl CompletedJob {
    pub(crate) fn new(job_id: JobId) -> Self {
        Self(job_id)
    }

    pub fn job_id(&self) -> &JobId {
        &self.0
    }
}

#[derive(Clone)]
pub struct JobWaiter {
    api: Arc<dyn DataRepoApi>,
    config: WaitConfig,
}

impl JobWaiter {
    pub fn new(api: Arc<dyn DataRepoApi>, config: WaitConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> WaitConfig {
        self.config
    }

    /// Poll until `succeeded`, `failed` or the time budget runs out.
    ///
    /// Server errors from the status call are logged and polled through.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn wait_for_job(&self, job_id: &JobId) -> Result<CompletedJob> {
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            match self.api.retrieve_job(job_id).await {
                Ok(job) if !job.job_status.is_terminal() => debug!(polls, "Job still running"),
                Ok(job) if job.job_status == JobStatus::Succeeded => {
                    info!(polls, elapsed = ?started.elapsed(), "Job succeeded");
                    return Ok(CompletedJob::new(job_id.clone()));
                },
                Ok(job) => {
                    return Err(HcaError::job_failed(
                        job_id.as_str(),
                        format!(
                            "job status {:?} (status code {})",
                            job.job_status,
                            job.status_code.map_or("unknown".to_string(), |c| c.to_string())
                        ),
                    ));
                },
                Err(e) if e.is_transient() => {
                    warn!(polls, error = %e, "Transient error polling job, will retry");
                },
                Err(e) => return Err(e),
            }

            if started.elapsed() >= self.config.max_wait_time {
                return Err(self.timeout(job_id));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Fetch the result of a finished job and apply `check` to it.
    ///
    /// Server errors are retried inside the same time budget as polling.
    #[instrument(skip(self), fields(job_id = %job.job_id()))]
    pub async fn check_job_result(&self, job: &CompletedJob, check: ResultCheck) -> Result<Value> {
        let started = Instant::now();

        let result = loop {
            match self.api.retrieve_job_result(job.job_id()).await {
                Ok(result) => break result,
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Transient error fetching job result, will retry");
                },
                Err(e) => return Err(e),
            }

            if started.elapsed() >= self.config.max_wait_time {
                return Err(self.timeout(job.job_id()));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        };

        check.verify(job.job_id(), &result)?;
        debug!(?check, "Job result verified");
        Ok(result)
    }

    /// Wait for the job, then verify its result.
    pub async fn wait_and_check(&self, job_id: &JobId, check: ResultCheck) -> Result<CompletedJob> {
        let completed = self.wait_for_job(job_id).await?;
        self.check_job_result(&completed, check).await?;
        Ok(completed)
    }

    fn timeout(&self, job_id: &JobId) -> HcaError {
        HcaError::Timeout {
            job_id: job_id.to_string(),
            waited: self.config.max_wait_time,
        }
    }
}
