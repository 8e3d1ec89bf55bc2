//! Scratch and staging area housekeeping

use crate::bigquery::QueryEngine;
use crate::load::reconcile::{superseded_rows, VersionedRow};
use crate::storage::{GcsPath, ObjectStore};
use hca_common::{
    types::{ScratchConfig, ScratchDatasetName},
    Result,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Create the run's scratch dataset with the configured table expiration.
#[instrument(skip(bigquery, scratch))]
pub async fn create_scratch_dataset(
    bigquery: &dyn QueryEngine,
    scratch: &ScratchConfig,
    load_tag: &str,
    location: &str,
) -> Result<ScratchDatasetName> {
    let dataset = scratch.dataset_name(load_tag);
    bigquery
        .create_dataset(
            &scratch.scratch_bq_project,
            dataset.dataset_id(),
            location,
            scratch.scratch_table_expiration_ms,
        )
        .await?;

    info!(dataset = %dataset, "Created scratch dataset");
    Ok(dataset)
}

/// Delete every object under `{scratch_prefix}/`, returning how many went.
#[instrument(skip(storage, scratch), fields(bucket = %scratch.scratch_bucket_name))]
pub async fn clear_scratch_dir(
    storage: &dyn ObjectStore,
    scratch: &ScratchConfig,
) -> Result<usize> {
    let prefix = format!("{}/", scratch.scratch_prefix_name.trim_end_matches('/'));
    let objects = storage
        .list_objects(&scratch.scratch_bucket_name, &prefix)
        .await?;

    for object in &objects {
        storage
            .delete_object(&scratch.scratch_bucket_name, &object.key)
            .await?;
    }

    info!(deleted = objects.len(), prefix = %prefix, "Cleared scratch directory");
    Ok(objects.len())
}

/// A staged entity file, `{dir}/{entity}_{version}...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub key: String,
    pub dir: String,
    pub entity: String,
    pub version: String,
}

impl StagedFile {
    /// `None` for names without an `_` separated version.
    pub fn parse(key: &str) -> Option<Self> {
        let (dir, name) = key.rsplit_once('/').unwrap_or(("", key));
        let mut parts = name.split('_');
        let entity = parts.next().filter(|entity| !entity.is_empty())?;
        let version = parts.next()?;

        Some(Self {
            key: key.to_string(),
            dir: dir.to_string(),
            entity: entity.to_string(),
            version: version.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupeReport {
    pub total_objects: usize,
    pub outdated: Vec<String>,
    pub deleted: usize,
}

/// Every file except the newest one of each entity in each directory. When
/// several files share the newest version the first listed one is kept.
pub fn identify_outdated_files(files: &[StagedFile]) -> Vec<String> {
    let rows: Vec<_> = files
        .iter()
        .map(|file| {
            VersionedRow::new(
                (file.dir.as_str(), file.entity.as_str()),
                file.version.as_str(),
                file.key.clone(),
            )
        })
        .collect();
    superseded_rows(&rows)
}

/// Find (and unless `skip_deletion`, delete) outdated entity files in a
/// `gs://` staging area. Objects under its `data/` directory are left alone.
#[instrument(skip(storage))]
pub async fn deduplicate_staging_area(
    storage: &dyn ObjectStore,
    staging_area: &str,
    skip_deletion: bool,
) -> Result<DedupeReport> {
    let location = GcsPath::parse(staging_area)?;
    let prefix = location.directory_prefix();
    let data_prefix = format!("{}data/", prefix);

    let objects = storage.list_objects(&location.bucket, &prefix).await?;
    let files: Vec<StagedFile> = objects
        .iter()
        .filter(|object| !object.key.starts_with(&data_prefix))
        .filter_map(|object| {
            let parsed = StagedFile::parse(&object.key);
            if parsed.is_none() {
                warn!(key = %object.key, "Skipping object without an entity version");
            }
            parsed
        })
        .collect();

    let outdated = identify_outdated_files(&files);
    info!(
        total_objects = files.len(),
        outdated = outdated.len(),
        "Evaluated staging area"
    );

    let mut deleted = 0;
    if !skip_deletion {
        for key in &outdated {
            storage.delete_object(&location.bucket, key).await?;
            deleted += 1;
        }
        info!(deleted, "Deleted outdated staging files");
    }

    Ok(DedupeReport {
        total_objects: files.len(),
        outdated,
        deleted,
    })
}
