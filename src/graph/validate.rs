use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use super::model::{Link, Node};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkSide {
    Source,
    Target,
}

impl fmt::Display for LinkSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Target => f.write_str("target"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node at index {index} has no id")]
    MissingNodeId { index: usize },
    #[error("node id {id:?} appears more than once")]
    DuplicateNodeId { id: String },
    #[error("link {link} {side} references unknown node id {id:?}")]
    UnknownEndpoint {
        id: String,
        link: usize,
        side: LinkSide,
    },
}

/// Links with both endpoints resolved to node indices.
#[derive(Clone, Debug, Default)]
pub struct ResolvedGraph {
    pub index_by_id: HashMap<String, usize>,
    pub edges: Vec<(usize, usize)>,
}

/// Checks node ids and maps every link endpoint to a node index.
///
/// The first problem found is reported; nothing is dropped silently.
pub fn resolve(nodes: &[Node], links: &[Link]) -> Result<ResolvedGraph, GraphError> {
    let mut index_by_id = HashMap::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        if node.id.is_empty() {
            return Err(GraphError::MissingNodeId { index });
        }
        if index_by_id.insert(node.id.clone(), index).is_some() {
            return Err(GraphError::DuplicateNodeId {
                id: node.id.clone(),
            });
        }
    }

    let lookup = |id: &str, link: usize, side: LinkSide| {
        index_by_id
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownEndpoint {
                id: id.to_owned(),
                link,
                side,
            })
    };

    let mut edges = Vec::with_capacity(links.len());
    for (link_index, link) in links.iter().enumerate() {
        let source = lookup(&link.source_id(), link_index, LinkSide::Source)?;
        let target = lookup(&link.target_id(), link_index, LinkSide::Target)?;
        edges.push((source, target));
    }

    Ok(ResolvedGraph { index_by_id, edges })
}

/// Incident link count per node. A self-loop contributes to both of its ends,
/// so it counts twice.
pub fn degrees(node_count: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut degrees = vec![0usize; node_count];
    for &(source, target) in edges {
        degrees[source] += 1;
        degrees[target] += 1;
    }
    degrees
}
