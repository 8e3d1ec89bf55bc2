//! Configuration management

use crate::bigquery::DEFAULT_BIGQUERY_API_URL;
use crate::data_repo::DEFAULT_DATA_REPO_TIMEOUT_SECS;
use crate::jobs::waiter::{DEFAULT_MAX_WAIT_TIME_SECS, DEFAULT_POLL_INTERVAL_SECS};
use crate::jobs::WaitConfig;
use crate::storage::StorageConfig;
use hca_common::types::{ScratchConfig, TargetDataset};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Orchestration Configuration Constants
// ============================================================================

/// Default data repository (TDR) host.
pub const DEFAULT_DATA_REPO_URL: &str = "https://data.terra.bio";

/// Default scratch dataset name prefix.
pub const DEFAULT_SCRATCH_DATASET_PREFIX: &str = "hca_scratch";

/// Default lifetime of scratch tables (two days).
pub const DEFAULT_SCRATCH_TABLE_EXPIRATION_MS: u64 = 2 * 24 * 60 * 60 * 1000;

/// Default BigQuery location.
pub const DEFAULT_BQ_LOCATION: &str = "US";

/// Default BigQuery job re-check interval in milliseconds.
pub const DEFAULT_BIGQUERY_JOB_POLL_INTERVAL_MS: u64 = 500;

/// Default number of metadata tables loaded at once.
pub const DEFAULT_LOAD_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRepoConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigQueryConfig {
    pub api_url: String,
    pub job_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitSettings {
    pub poll_interval_secs: u64,
    pub max_wait_time_secs: u64,
}

impl WaitSettings {
    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.max_wait_time_secs),
        )
    }
}

/// Everything the binary needs, read from the environment.
///
/// Storage credentials and the OAuth token are loaded separately by the
/// commands that need them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    pub scratch: ScratchConfig,
    pub target: TargetDataset,
    pub data_repo: DataRepoConfig,
    pub bigquery: BigQueryConfig,
    pub wait: WaitSettings,
    pub load_concurrency: usize,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl OrchestrationConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = OrchestrationConfig {
            scratch: ScratchConfig {
                scratch_bucket_name: var_or("HCA_SCRATCH_BUCKET", ""),
                scratch_prefix_name: var_or("HCA_SCRATCH_PREFIX", ""),
                scratch_bq_project: var_or("HCA_SCRATCH_BQ_PROJECT", ""),
                scratch_dataset_prefix: var_or(
                    "HCA_SCRATCH_DATASET_PREFIX",
                    DEFAULT_SCRATCH_DATASET_PREFIX,
                ),
                scratch_table_expiration_ms: parsed_or(
                    "HCA_SCRATCH_TABLE_EXPIRATION_MS",
                    DEFAULT_SCRATCH_TABLE_EXPIRATION_MS,
                ),
            },
            target: TargetDataset {
                dataset_name: var_or("HCA_TARGET_DATASET_NAME", ""),
                dataset_id: var_or("HCA_TARGET_DATASET_ID", ""),
                project_id: var_or("HCA_TARGET_PROJECT_ID", ""),
                billing_profile_id: var_or("HCA_TARGET_BILLING_PROFILE_ID", ""),
                bq_location: var_or("HCA_TARGET_BQ_LOCATION", DEFAULT_BQ_LOCATION),
            },
            data_repo: DataRepoConfig {
                url: var_or("DATA_REPO_URL", DEFAULT_DATA_REPO_URL),
                timeout_secs: parsed_or("DATA_REPO_TIMEOUT_SECS", DEFAULT_DATA_REPO_TIMEOUT_SECS),
            },
            bigquery: BigQueryConfig {
                api_url: var_or("BIGQUERY_API_URL", DEFAULT_BIGQUERY_API_URL),
                job_poll_interval_ms: parsed_or(
                    "BIGQUERY_JOB_POLL_INTERVAL_MS",
                    DEFAULT_BIGQUERY_JOB_POLL_INTERVAL_MS,
                ),
            },
            wait: WaitSettings {
                poll_interval_secs: parsed_or("JOB_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS),
                max_wait_time_secs: parsed_or("JOB_MAX_WAIT_TIME_SECS", DEFAULT_MAX_WAIT_TIME_SECS),
            },
            load_concurrency: parsed_or("LOAD_CONCURRENCY", DEFAULT_LOAD_CONCURRENCY),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let required = [
            ("HCA_SCRATCH_BUCKET", &self.scratch.scratch_bucket_name),
            ("HCA_SCRATCH_PREFIX", &self.scratch.scratch_prefix_name),
            ("HCA_SCRATCH_BQ_PROJECT", &self.scratch.scratch_bq_project),
            ("HCA_TARGET_DATASET_NAME", &self.target.dataset_name),
            ("HCA_TARGET_DATASET_ID", &self.target.dataset_id),
            ("HCA_TARGET_PROJECT_ID", &self.target.project_id),
        ];
        for (name, value) in required {
            if value.is_empty() {
                anyhow::bail!("{} must be set", name);
            }
        }

        if self.scratch.scratch_prefix_name.ends_with('/') {
            anyhow::bail!(
                "HCA_SCRATCH_PREFIX must not end with a trailing slash: {}",
                self.scratch.scratch_prefix_name
            );
        }

        if self.wait.poll_interval_secs > self.wait.max_wait_time_secs {
            anyhow::bail!(
                "Job poll interval ({}s) cannot exceed the max wait time ({}s)",
                self.wait.poll_interval_secs,
                self.wait.max_wait_time_secs
            );
        }

        if self.load_concurrency == 0 {
            anyhow::bail!("LOAD_CONCURRENCY must be greater than 0");
        }

        Ok(())
    }
}

/// OAuth bearer token for the BigQuery and data repository APIs.
pub fn access_token() -> anyhow::Result<String> {
    env::var("GOOGLE_OAUTH_ACCESS_TOKEN")
        .map_err(|_| anyhow::anyhow!("GOOGLE_OAUTH_ACCESS_TOKEN must be set"))
}

/// Object storage settings, `GCS_*`.
pub fn storage_config() -> anyhow::Result<StorageConfig> {
    StorageConfig::from_env()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid() -> OrchestrationConfig {
        OrchestrationConfig {
            scratch: ScratchConfig::new("bucket", "prefix", "project", "hca_scratch", 1000),
            target: TargetDataset::new("hca_dev", "id", "tdr-project", "profile", "US"),
            data_repo: DataRepoConfig {
                url: DEFAULT_DATA_REPO_URL.to_string(),
                timeout_secs: DEFAULT_DATA_REPO_TIMEOUT_SECS,
            },
            bigquery: BigQueryConfig {
                api_url: DEFAULT_BIGQUERY_API_URL.to_string(),
                job_poll_interval_ms: DEFAULT_BIGQUERY_JOB_POLL_INTERVAL_MS,
            },
            wait: WaitSettings {
                poll_interval_secs: 5,
                max_wait_time_secs: 60,
            },
            load_concurrency: DEFAULT_LOAD_CONCURRENCY,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
        assert_eq!(
            valid().wait.wait_config(),
            WaitConfig::new(Duration::from_secs(5), Duration::from_secs(60))
        );
    }

    #[test]
    fn test_missing_target_rejected() {
        let mut config = valid();
        config.target.dataset_id = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("HCA_TARGET_DATASET_ID"));
    }

    #[test]
    fn test_trailing_slash_prefix_rejected() {
        let mut config = valid();
        config.scratch.scratch_prefix_name = "prefix/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_interval_bounded_by_max_wait() {
        let mut config = valid();
        config.wait.poll_interval_secs = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = valid();
        config.load_concurrency = 0;
        assert!(config.validate().is_err());
    }
}
