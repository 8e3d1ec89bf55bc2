//! Partition keys published as CSV files in a bucket

use crate::storage::ObjectStore;
use hca_common::Result;
use tracing::{info, instrument};

/// Read the partition keys for `pipeline_name` from `gs://{bucket}/{pipeline_name}*.csv`.
///
/// Each non-empty record contributes its first column. Objects that are not
/// `.csv` files are skipped.
#[instrument(skip(storage))]
pub async fn partition_keys(
    storage: &dyn ObjectStore,
    bucket: &str,
    pipeline_name: &str,
) -> Result<Vec<String>> {
    let objects = storage.list_objects(bucket, pipeline_name).await?;
    let mut keys = Vec::new();

    for object in objects {
        if !object.key.ends_with(".csv") {
            info!(key = %object.key, "Object is not a CSV, ignoring");
            continue;
        }

        let content = storage.read_text(bucket, &object.key).await?;
        keys.extend(parse_partition_file(&content)?);
    }

    info!(count = keys.len(), "Found partition keys");
    Ok(keys)
}

fn parse_partition_file(content: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut keys = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(key) = record.get(0).map(str::trim).filter(|key| !key.is_empty()) {
            keys.push(key.to_string());
        }
    }
    Ok(keys)
}
