use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;

use super::model::{GraphData, Link, Node};

/// Reads a `{ "nodes": [...], "links": [...] }` document. Numeric node ids are
/// turned into strings so they match the way link endpoints are normalized.
pub fn parse_graph_json(raw: &str) -> Result<GraphData> {
    let parsed: Value = serde_json::from_str(raw).context("invalid graph JSON")?;
    let object = parsed
        .as_object()
        .ok_or_else(|| anyhow!("graph JSON must be an object with nodes and links"))?;

    let raw_nodes = object
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("graph JSON has no nodes array"))?;

    let mut nodes = Vec::with_capacity(raw_nodes.len());
    for (index, raw_node) in raw_nodes.iter().enumerate() {
        let mut raw_node = raw_node.clone();
        if let Some(id) = raw_node.get_mut("id")
            && let Some(number) = id.as_i64()
        {
            *id = Value::String(number.to_string());
        }
        let node = serde_json::from_value::<Node>(raw_node)
            .with_context(|| format!("invalid node at index {index}"))?;
        nodes.push(node);
    }

    let raw_links = object
        .get("links")
        .or_else(|| object.get("edges"))
        .and_then(Value::as_array);

    let mut links = Vec::new();
    if let Some(raw_links) = raw_links {
        links.reserve(raw_links.len());
        for (index, raw_link) in raw_links.iter().enumerate() {
            let link = Link::deserialize(raw_link)
                .with_context(|| format!("invalid link at index {index}"))?;
            links.push(link);
        }
    }

    log::debug!("parsed graph with {} nodes and {} links", nodes.len(), links.len());
    Ok(GraphData { nodes, links })
}
