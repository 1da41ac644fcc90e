use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Cluster label attached to a node. Datasets use either small integers or
/// free-form names, and neither is guaranteed to be dense.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Community {
    Index(i64),
    Label(String),
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<Community>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub era: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub influence_score: Option<f64>,
    /// Incident link count. Recomputed by the engine and never read from
    /// input.
    #[serde(default, skip_deserializing)]
    pub degree: usize,
    /// Collision and charge size, derived from `degree`.
    #[serde(default, skip_deserializing)]
    pub radius: f64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f64>,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_community(mut self, community: Community) -> Self {
        self.community = Some(community);
        self
    }

    pub fn with_era(mut self, era: impl Into<String>) -> Self {
        self.era = Some(era.into());
        self
    }

    pub fn with_birth_year(mut self, year: f64) -> Self {
        self.birth_year = Some(year);
        self
    }

    pub fn with_influence(mut self, score: f64) -> Self {
        self.influence_score = Some(score);
        self
    }

    /// Name for tables; falls back to the id when the dataset has no label.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn has_finite_position(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: LinkId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkId {
    Text(String),
    Number(i64),
}

impl LinkId {
    fn as_id(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Number(number) => Cow::Owned(number.to_string()),
        }
    }
}

/// One end of a link: a bare id, or a node object carried over from a
/// renderer that already resolved the reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkEnd {
    Id(LinkId),
    Node(NodeRef),
}

impl LinkEnd {
    pub fn id(&self) -> Cow<'_, str> {
        match self {
            Self::Id(id) => id.as_id(),
            Self::Node(node) => node.id.as_id(),
        }
    }
}

impl From<&str> for LinkEnd {
    fn from(value: &str) -> Self {
        Self::Id(LinkId::Text(value.to_owned()))
    }
}

impl From<String> for LinkEnd {
    fn from(value: String) -> Self {
        Self::Id(LinkId::Text(value))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: LinkEnd,
    pub target: LinkEnd,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

impl Link {
    pub fn new(source: impl Into<LinkEnd>, target: impl Into<LinkEnd>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: None,
            strength: None,
        }
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn source_id(&self) -> Cow<'_, str> {
        self.source.id()
    }

    pub fn target_id(&self) -> Cow<'_, str> {
        self.target.id()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<Node>,
    #[serde(alias = "edges")]
    pub links: Vec<Link>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 800.0,
        }
    }
}

impl Dimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    pub fn min_side(self) -> f64 {
        self.width.min(self.height)
    }

    pub fn max_side(self) -> f64 {
        self.width.max(self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_ends_accept_ids_numbers_and_node_objects() {
        let link: Link = serde_json::from_value(serde_json::json!({
            "source": "plato",
            "target": { "id": "aristotle", "name": "Aristotle", "x": 4.0 },
            "relation": "student of"
        }))
        .unwrap();
        assert_eq!(link.source_id(), "plato");
        assert_eq!(link.target_id(), "aristotle");

        let numeric: Link =
            serde_json::from_value(serde_json::json!({ "source": 3, "target": "7" })).unwrap();
        assert_eq!(numeric.source_id(), "3");
        assert_eq!(numeric.target_id(), "7");
    }

    #[test]
    fn node_uses_camel_case_fields() {
        let node: Node = serde_json::from_value(serde_json::json!({
            "id": "kant",
            "name": "Immanuel Kant",
            "community": "idealism",
            "birthYear": 1724,
            "influenceScore": 0.93,
            "fx": 10.0
        }))
        .unwrap();
        assert_eq!(node.community, Some(Community::Label("idealism".into())));
        assert_eq!(node.birth_year, Some(1724.0));
        assert_eq!(node.influence_score, Some(0.93));
        assert_eq!(node.fx, Some(10.0));
        assert_eq!(node.fy, None);
    }

    #[test]
    fn graph_accepts_edges_alias() {
        let graph: GraphData = serde_json::from_value(serde_json::json!({
            "nodes": [{ "id": "a" }, { "id": "b" }],
            "edges": [{ "source": "a", "target": "b" }]
        }))
        .unwrap();
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.nodes[0].display_name(), "a");
    }
}
