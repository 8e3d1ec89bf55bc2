//! Object storage access
//!
//! The pipeline only needs to list, probe, read and delete objects, so
//! [`ObjectStore`] is kept to those four calls. [`GcsStorage`] talks to Cloud
//! Storage through its S3-interoperable XML API.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    Client,
};
use hca_common::{HcaError, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, instrument};

pub mod config;

pub use config::StorageConfig;

/// A listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: i64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object whose key starts with `prefix`.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;

    async fn read_text(&self, bucket: &str, key: &str) -> Result<String>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// True when at least one non-empty object lives under `prefix`.
    async fn has_any_data(&self, bucket: &str, prefix: &str) -> Result<bool> {
        let objects = self.list_objects(bucket, prefix).await?;
        Ok(objects.iter().any(|object| object.size > 0))
    }
}

static GS_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^gs://([a-z0-9\-_.]+)/?([A-Za-z0-9\-_/.]*)$").ok());

/// A parsed `gs://bucket/prefix` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsPath {
    pub bucket: String,
    pub prefix: String,
}

impl GcsPath {
    pub fn parse(path: &str) -> Result<Self> {
        let captures = GS_PATH
            .as_ref()
            .and_then(|re| re.captures(path))
            .ok_or_else(|| HcaError::Parse(format!("Not a gs:// path: {}", path)))?;

        Ok(Self {
            bucket: captures[1].to_string(),
            prefix: captures[2].to_string(),
        })
    }

    /// The prefix with exactly one trailing slash, or empty for a bucket root.
    pub fn directory_prefix(&self) -> String {
        let trimmed = self.prefix.trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        }
    }
}

#[derive(Clone)]
pub struct GcsStorage {
    client: Client,
}

impl GcsStorage {
    pub fn new(config: StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "hca-storage",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .force_path_style(config.path_style)
            .build();

        info!(endpoint = %config.endpoint, "Storage client initialized");

        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for GcsStorage {
    #[instrument(skip(self))]
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    HcaError::storage(format!(
                        "Failed to list gs://{}/{}: {}",
                        bucket,
                        prefix,
                        DisplayErrorContext(&e)
                    ))
                })?;

            objects.extend(response.contents().iter().filter_map(|object| {
                object.key().map(|key| ObjectInfo {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0),
                })
            }));

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        debug!("Listed {} objects under gs://{}/{}", objects.len(), bucket, prefix);
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn read_text(&self, bucket: &str, key: &str) -> Result<String> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                HcaError::storage(format!(
                    "Failed to download gs://{}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| HcaError::storage(format!("Failed to read object body: {}", e)))?
            .into_bytes();

        String::from_utf8(data.to_vec())
            .map_err(|e| HcaError::Parse(format!("gs://{}/{} is not UTF-8: {}", bucket, key, e)))
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                HcaError::storage(format!(
                    "Failed to delete gs://{}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!("Deleted gs://{}/{}", bucket, key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::FakeStorage;

    #[test]
    fn test_parse_gcs_path() {
        let path = GcsPath::parse("gs://broad-dsp-monster-hca-prod/staging/area_1").unwrap();
        assert_eq!(path.bucket, "broad-dsp-monster-hca-prod");
        assert_eq!(path.prefix, "staging/area_1");
        assert_eq!(path.directory_prefix(), "staging/area_1/");

        let root = GcsPath::parse("gs://bucket/").unwrap();
        assert_eq!(root.prefix, "");
        assert_eq!(root.directory_prefix(), "");
    }

    #[test]
    fn test_parse_rejects_non_gcs_paths() {
        assert!(GcsPath::parse("s3://bucket/prefix").is_err());
        assert!(GcsPath::parse("bucket/prefix").is_err());
    }

    #[tokio::test]
    async fn test_has_any_data_ignores_empty_objects() {
        let storage = FakeStorage::default();
        storage.put_sized("bucket", "prefix/process/empty.json", 0);
        assert!(!storage.has_any_data("bucket", "prefix/process/").await.unwrap());

        storage.put("bucket", "prefix/process/part-0.json", "{}");
        assert!(storage.has_any_data("bucket", "prefix/process/").await.unwrap());
        assert!(!storage.has_any_data("bucket", "prefix/links/").await.unwrap());
    }
}
