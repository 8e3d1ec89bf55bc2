use serde::{Deserialize, Serialize};
use std::env;

/// GCS XML API endpoint that accepts S3-style requests signed with HMAC keys.
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

// Keys stay out of logs.
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("path_style", &self.path_style)
            .finish_non_exhaustive()
    }
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: env::var("GCS_ENDPOINT").unwrap_or_else(|_| DEFAULT_GCS_ENDPOINT.to_string()),
            region: env::var("GCS_REGION").unwrap_or_else(|_| "auto".to_string()),
            access_key: env::var("GCS_HMAC_ACCESS_KEY")
                .map_err(|_| anyhow::anyhow!("GCS_HMAC_ACCESS_KEY must be set"))?,
            secret_key: env::var("GCS_HMAC_SECRET")
                .map_err(|_| anyhow::anyhow!("GCS_HMAC_SECRET must be set"))?,
            path_style: env::var("GCS_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        })
    }

    /// Point at a local S3-compatible emulator.
    pub fn for_emulator(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: "us-east-1".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }
}
