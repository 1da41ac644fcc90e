//! Read-only tables derived from a graph snapshot. Every function is a pure
//! function of its inputs and ignores layout state.

use std::collections::HashMap;

use serde::Serialize;

use crate::graph::{Link, Node};

pub const DEFAULT_TOP_K: usize = 10;
const DEFAULT_RELATION: &str = "default";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InfluenceEntry {
    pub id: String,
    pub name: String,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectivityEntry {
    pub id: String,
    pub name: String,
    pub connections: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub node_count: usize,
    pub link_count: usize,
    pub density: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CategoryKey {
    Era,
    Community,
    School,
}

impl CategoryKey {
    pub fn label(self) -> &'static str {
        match self {
            Self::Era => "era",
            Self::Community => "community",
            Self::School => "school",
        }
    }

    pub fn value_of(self, node: &Node) -> Option<String> {
        match self {
            Self::Era => node.era.clone(),
            Self::Community => node.community.as_ref().map(ToString::to_string),
            Self::School => node.school.clone(),
        }
    }
}

/// Top `k` nodes by influence score, highest first. Missing scores count as
/// zero; equal scores keep their input order.
pub fn rank_by_influence(nodes: &[Node], k: usize) -> Vec<InfluenceEntry> {
    let mut ranked = nodes.iter().collect::<Vec<_>>();
    ranked.sort_by(|a, b| {
        let a_score = a.influence_score.unwrap_or(0.0);
        let b_score = b.influence_score.unwrap_or(0.0);
        b_score.total_cmp(&a_score)
    });
    ranked.truncate(k);
    ranked
        .into_iter()
        .map(|node| InfluenceEntry {
            id: node.id.clone(),
            name: node.display_name().to_owned(),
            score: node.influence_score.unwrap_or(0.0),
        })
        .collect()
}

/// Top `k` nodes by number of link endpoints in `links`, highest first.
///
/// Counts come from the link list itself, never from a cached `degree`.
/// Links touching unknown ids are ignored, and equal counts keep node input
/// order, so the result does not depend on link order.
pub fn rank_by_connectivity(nodes: &[Node], links: &[Link], k: usize) -> Vec<ConnectivityEntry> {
    let mut index_by_id = HashMap::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        index_by_id.entry(node.id.as_str()).or_insert(index);
    }

    let mut counts = vec![0usize; nodes.len()];
    for link in links {
        for id in [link.source_id(), link.target_id()] {
            if let Some(&index) = index_by_id.get(id.as_ref()) {
                counts[index] += 1;
            }
        }
    }

    let mut ranked = (0..nodes.len()).collect::<Vec<_>>();
    ranked.sort_by(|a, b| counts[*b].cmp(&counts[*a]));
    ranked.truncate(k);
    ranked
        .into_iter()
        .map(|index| ConnectivityEntry {
            id: nodes[index].id.clone(),
            name: nodes[index].display_name().to_owned(),
            connections: counts[index],
        })
        .collect()
}

fn tally(values: impl Iterator<Item = String>, k: Option<usize>) -> Vec<CategoryCount> {
    let mut slot_by_value: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<CategoryCount> = Vec::new();
    for value in values {
        match slot_by_value.get(&value) {
            Some(&slot) => counts[slot].count += 1,
            None => {
                slot_by_value.insert(value.clone(), counts.len());
                counts.push(CategoryCount { value, count: 1 });
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    if let Some(k) = k {
        counts.truncate(k);
    }
    counts
}

/// Node count per distinct value of `key`, largest first. Nodes without the
/// attribute are skipped; ties keep first-appearance order. `k = None`
/// returns every value.
pub fn distribution_by_category(
    nodes: &[Node],
    key: CategoryKey,
    k: Option<usize>,
) -> Vec<CategoryCount> {
    tally(nodes.iter().filter_map(|node| key.value_of(node)), k)
}

/// Link count per relation label, largest first. An empty label is reported
/// as `"default"`; links without a relation are skipped.
pub fn distribution_by_relation(links: &[Link]) -> Vec<CategoryCount> {
    tally(
        links.iter().filter_map(|link| {
            link.relation.as_ref().map(|relation| {
                if relation.is_empty() {
                    DEFAULT_RELATION.to_owned()
                } else {
                    relation.clone()
                }
            })
        }),
        None,
    )
}

pub fn network_stats(nodes: &[Node], links: &[Link]) -> NetworkStats {
    let node_count = nodes.len();
    let link_count = links.len();
    let density = if node_count > 1 {
        (2 * link_count) as f64 / (node_count * (node_count - 1)) as f64
    } else {
        0.0
    };

    NetworkStats {
        node_count,
        link_count,
        density,
    }
}
