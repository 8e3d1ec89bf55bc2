//! Structural checks on a loaded dataset

use crate::bigquery::{QueryEngine, QueryParameter};
use crate::load::reconcile::new_keys;
use hca_common::{
    types::{MetadataType, TargetDataset},
    HcaError, Result,
};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

pub mod links;

pub use links::{build_subgraph_nodes, SubgraphNodes};

/// Ids sent per membership query.
pub const ENTITY_ID_CHUNK_SIZE: usize = 20_000;

fn string_column(rows: &[serde_json::Map<String, Value>], column: &str) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|row| row.get(column).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// HCA project ids present in the dataset's `project` table.
pub async fn projects_in_dataset(
    bigquery: &dyn QueryEngine,
    target: &TargetDataset,
) -> Result<BTreeSet<String>> {
    let query = format!(
        "SELECT DISTINCT project_id FROM `{}`",
        target.table("project")
    );
    let rows = bigquery
        .run_query(&query, &target.project_id, &target.bq_location, &[])
        .await?;
    Ok(string_column(&rows, "project_id"))
}

/// Fail unless every expected id of `entity_type` is loaded.
#[instrument(skip(bigquery, target, expected), fields(expected_ids = expected.len()))]
pub async fn verify_entities_loaded(
    bigquery: &dyn QueryEngine,
    target: &TargetDataset,
    entity_type: &MetadataType,
    expected: &BTreeSet<String>,
) -> Result<()> {
    let pk = entity_type.primary_key();
    let query = format!(
        "SELECT {pk} FROM `{table}` WHERE {pk} IN UNNEST(@entity_ids)",
        pk = pk,
        table = target.table(entity_type.as_str()),
    );

    let ids: Vec<&String> = expected.iter().collect();
    for chunk in ids.chunks(ENTITY_ID_CHUNK_SIZE) {
        let params = [QueryParameter::string_array(
            "entity_ids",
            chunk.iter().map(|id| id.to_string()).collect(),
        )];
        let rows = bigquery
            .run_query(&query, &target.project_id, &target.bq_location, &params)
            .await?;
        let loaded = string_column(&rows, &pk);

        let missing = new_keys(chunk.iter().map(|id| Some(*id)), &loaded);
        if !missing.is_empty() {
            return Err(HcaError::validation(format!(
                "Not all expected IDs found for {} [diff = {:?}]",
                entity_type, missing
            )));
        }
        debug!(chunk = chunk.len(), "Chunk verified");
    }
    Ok(())
}

/// Check that the dataset holds exactly `expected_project` and that every
/// entity its links reference was loaded.
#[instrument(skip(bigquery, target), fields(dataset = %target.dataset_name))]
pub async fn verify_subgraphs(
    bigquery: &dyn QueryEngine,
    target: &TargetDataset,
    expected_project: &str,
) -> Result<()> {
    let projects = projects_in_dataset(bigquery, target).await?;
    let expected: BTreeSet<String> = [expected_project.to_string()].into_iter().collect();
    if projects != expected {
        return Err(HcaError::validation(format!(
            "Incorrect projects present in dataset {}, should be {}, found {:?}",
            target.dataset_name, expected_project, projects
        )));
    }

    let links_query = format!("SELECT * FROM `{}`", target.table("links"));
    let links_rows = bigquery
        .run_query(&links_query, &target.project_id, &target.bq_location, &[])
        .await?;
    if links_rows.is_empty() {
        return Err(HcaError::validation(format!(
            "No links rows in dataset {}",
            target.dataset_name
        )));
    }

    let nodes = build_subgraph_nodes(&links_rows)?;
    for (entity_type, ids) in &nodes {
        verify_entities_loaded(bigquery, target, entity_type, ids).await?;
    }

    info!(
        links = links_rows.len(),
        entity_types = nodes.len(),
        "Subgraphs verified"
    );
    Ok(())
}
