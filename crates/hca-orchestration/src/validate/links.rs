//! Subgraph nodes described by `links` rows

use crate::bigquery::Row;
use hca_common::{types::MetadataType, HcaError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Entity ids grouped by the table they live in.
pub type SubgraphNodes = BTreeMap<MetadataType, BTreeSet<String>>;

#[derive(Debug, Default, Deserialize)]
struct LinksContent {
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "link_type", rename_all = "snake_case")]
enum Link {
    ProcessLink {
        process_id: String,
        process_type: String,
        #[serde(default)]
        inputs: Vec<InputRef>,
        #[serde(default)]
        outputs: Vec<OutputRef>,
        #[serde(default)]
        protocols: Vec<ProtocolRef>,
    },
    SupplementaryFileLink {
        #[serde(default)]
        files: Vec<FileRef>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct InputRef {
    input_id: String,
    input_type: String,
}

#[derive(Debug, Deserialize)]
struct OutputRef {
    output_id: String,
    output_type: String,
}

#[derive(Debug, Deserialize)]
struct ProtocolRef {
    protocol_id: String,
    protocol_type: String,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
    file_type: String,
}

fn field<'a>(row: &'a Row, name: &str) -> Result<&'a str> {
    row.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| HcaError::Parse(format!("links row is missing '{}'", name)))
}

fn add(nodes: &mut SubgraphNodes, entity_type: &str, id: &str) {
    nodes
        .entry(MetadataType::new(entity_type))
        .or_default()
        .insert(id.to_string());
}

/// Collect every entity a set of `links` rows points at.
///
/// `content` may arrive as a JSON string (as stored) or as an already
/// decoded object.
pub fn build_subgraph_nodes(rows: &[Row]) -> Result<SubgraphNodes> {
    let mut nodes = SubgraphNodes::new();

    for row in rows {
        add(&mut nodes, "links", field(row, "links_id")?);
        add(&mut nodes, "project", field(row, "project_id")?);

        let content: LinksContent = match row.get("content") {
            Some(Value::String(raw)) => serde_json::from_str(raw)?,
            Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())?,
            _ => LinksContent::default(),
        };

        for link in content.links {
            match link {
                Link::ProcessLink {
                    process_id,
                    process_type,
                    inputs,
                    outputs,
                    protocols,
                } => {
                    add(&mut nodes, &process_type, &process_id);
                    for input in inputs {
                        add(&mut nodes, &input.input_type, &input.input_id);
                    }
                    for output in outputs {
                        add(&mut nodes, &output.output_type, &output.output_id);
                    }
                    for protocol in protocols {
                        add(&mut nodes, &protocol.protocol_type, &protocol.protocol_id);
                    }
                },
                Link::SupplementaryFileLink { files } => {
                    for file in files {
                        add(&mut nodes, &file.file_type, &file.file_id);
                    }
                },
                Link::Other => {},
            }
        }
    }

    Ok(nodes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn links_row(content: Value) -> Row {
        json!({
            "links_id": "l1",
            "project_id": "proj-1",
            "content": content.to_string(),
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn test_process_link_nodes() {
        let row = links_row(json!({
            "links": [{
                "link_type": "process_link",
                "process_id": "p1",
                "process_type": "analysis_process",
                "inputs": [{"input_id": "s1", "input_type": "sequence_file"}],
                "outputs": [{"output_id": "a1", "output_type": "analysis_file"}],
                "protocols": [{"protocol_id": "pr1", "protocol_type": "analysis_protocol"}]
            }, {
                "link_type": "supplementary_file_link",
                "entity": {"entity_type": "project", "entity_id": "proj-1"},
                "files": [{"file_id": "sf1", "file_type": "supplementary_file"}]
            }]
        }));

        let nodes = build_subgraph_nodes(&[row]).unwrap();

        let ids = |t: &str| nodes[&MetadataType::new(t)].iter().cloned().collect::<Vec<_>>();
        assert_eq!(ids("links"), vec!["l1"]);
        assert_eq!(ids("project"), vec!["proj-1"]);
        assert_eq!(ids("analysis_process"), vec!["p1"]);
        assert_eq!(ids("sequence_file"), vec!["s1"]);
        assert_eq!(ids("analysis_file"), vec!["a1"]);
        assert_eq!(ids("analysis_protocol"), vec!["pr1"]);
        assert_eq!(ids("supplementary_file"), vec!["sf1"]);
    }

    #[test]
    fn test_missing_links_id_is_an_error() {
        let row = json!({"project_id": "p"}).as_object().unwrap().clone();
        assert!(build_subgraph_nodes(&[row]).is_err());
    }

    #[test]
    fn test_malformed_content_is_an_error() {
        let row = json!({"links_id": "l", "project_id": "p", "content": "{not json"})
            .as_object()
            .unwrap()
            .clone();
        assert!(build_subgraph_nodes(&[row]).is_err());
    }
}
