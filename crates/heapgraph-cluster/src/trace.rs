//! Leak traces: owned, serializable copies of root-to-leak paths.
//!
//! A [`LeakTracePath`] is the structured form (a root node followed by
//! `(edge, node)` hops); a [`LeakTrace`] is the flat alternating element
//! sequence that similarity strategies compare and that is persisted as a
//! JSON array of `kind`-tagged records.

use serde::{Deserialize, Serialize};

use heapgraph_core::{EdgeName, HeapEdge, HeapNode, HeapPath, HeapSnapshot};

use crate::error::ClusterError;

/// Owned copy of a node view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub self_size: u64,
    /// `None` when dominators were not computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retained_size: Option<f64>,
    #[serde(default)]
    pub detached: bool,
}

impl NodeRecord {
    pub fn from_node(node: &HeapNode<'_>) -> Self {
        NodeRecord {
            id: node.id(),
            name: node.name().into_owned(),
            node_type: node.type_name().to_string(),
            self_size: node.self_size(),
            retained_size: node.retained_size().ok(),
            detached: node.is_detached(),
        }
    }
}

/// An edge label: numeric for indexed edges, otherwise a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeLabel {
    Index(u64),
    Name(String),
}

impl EdgeLabel {
    pub fn is_index(&self) -> bool {
        matches!(self, EdgeLabel::Index(_))
    }
}

impl std::fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeLabel::Index(i) => write!(f, "{i}"),
            EdgeLabel::Name(name) => f.write_str(name),
        }
    }
}

/// Owned copy of an edge view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub name_or_index: EdgeLabel,
    #[serde(rename = "type")]
    pub edge_type: String,
}

impl EdgeRecord {
    pub fn from_edge(edge: &HeapEdge<'_>) -> Self {
        let name_or_index = match edge.name_or_index() {
            EdgeName::Index(i) => EdgeLabel::Index(i),
            EdgeName::Name(name) => EdgeLabel::Name(name.to_string()),
        };
        EdgeRecord {
            name_or_index,
            edge_type: edge.type_name().to_string(),
        }
    }
}

/// One element of a flat trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TraceElement {
    Node(NodeRecord),
    Edge(EdgeRecord),
}

impl TraceElement {
    pub fn is_node(&self) -> bool {
        matches!(self, TraceElement::Node(_))
    }

    /// Node name or edge label as text.
    pub fn label(&self) -> String {
        match self {
            TraceElement::Node(node) => node.name.clone(),
            TraceElement::Edge(edge) => edge.name_or_index.to_string(),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            TraceElement::Node(node) => &node.node_type,
            TraceElement::Edge(edge) => &edge.edge_type,
        }
    }

    pub fn as_node(&self) -> Option<&NodeRecord> {
        match self {
            TraceElement::Node(node) => Some(node),
            TraceElement::Edge(_) => None,
        }
    }
}

/// A flat root-first `node, edge, node, ..., node` sequence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeakTrace {
    pub elements: Vec<TraceElement>,
}

impl LeakTrace {
    pub fn new(elements: Vec<TraceElement>) -> Self {
        LeakTrace { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The last node record, i.e. the leaked object (or the first detached
    /// node when the trace was truncated).
    pub fn last_node(&self) -> Option<&NodeRecord> {
        self.elements.iter().rev().find_map(TraceElement::as_node)
    }

    /// Checks the alternating shape: starts and ends with a node.
    pub fn validate(&self) -> Result<(), ClusterError> {
        for (position, element) in self.elements.iter().enumerate() {
            let expect_node = position % 2 == 0;
            if element.is_node() != expect_node {
                let expected = if expect_node { "node" } else { "edge" };
                return Err(ClusterError::MalformedTrace {
                    reason: format!("element {position} should be a {expected}"),
                });
            }
        }
        if !self.elements.is_empty() && self.elements.len() % 2 == 0 {
            return Err(ClusterError::MalformedTrace {
                reason: "trace ends with an edge".to_string(),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ClusterError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes and validates a persisted trace.
    pub fn from_json(json: &str) -> Result<Self, ClusterError> {
        let trace: LeakTrace = serde_json::from_str(json)?;
        trace.validate()?;
        Ok(trace)
    }

    /// Content fingerprint over element kinds, labels and types.
    ///
    /// Ids and sizes are left out, so the same retention pattern leaking
    /// different objects fingerprints identically.
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        for element in &self.elements {
            hasher.update(if element.is_node() { b"n" } else { b"e" });
            let label = element.label();
            hasher.update(&(label.len() as u64).to_le_bytes());
            hasher.update(label.as_bytes());
            let type_name = element.type_name();
            hasher.update(&(type_name.len() as u64).to_le_bytes());
            hasher.update(type_name.as_bytes());
        }
        hasher.finalize()
    }
}

/// Structured path form: a root node followed by `(edge, node)` hops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakTracePath {
    pub root: NodeRecord,
    pub hops: Vec<(EdgeRecord, NodeRecord)>,
}

impl LeakTracePath {
    /// Copies an extracted heap path out of the snapshot.
    pub fn from_heap_path(snapshot: &HeapSnapshot, path: &HeapPath) -> Option<Self> {
        let views = path.views(snapshot);
        let (first, rest) = views.split_first()?;
        let mut hops = Vec::with_capacity(rest.len());
        let mut pending = first.1;
        for (node, edge) in rest {
            hops.push((EdgeRecord::from_edge(&pending?), NodeRecord::from_node(node)));
            pending = *edge;
        }
        Some(LeakTracePath {
            root: NodeRecord::from_node(&first.0),
            hops,
        })
    }

    pub fn leaked_node(&self) -> &NodeRecord {
        self.hops.last().map(|(_, node)| node).unwrap_or(&self.root)
    }
}

/// Flattens a path into a trace, optionally stopping at the first detached
/// node.
pub fn path_to_trace(path: &LeakTracePath, until_first_detached: bool) -> LeakTrace {
    let mut elements = Vec::with_capacity(path.hops.len() * 2 + 1);
    elements.push(TraceElement::Node(path.root.clone()));
    if !(until_first_detached && path.root.detached) {
        for (edge, node) in &path.hops {
            elements.push(TraceElement::Edge(edge.clone()));
            elements.push(TraceElement::Node(node.clone()));
            if until_first_detached && node.detached {
                break;
            }
        }
    }
    LeakTrace { elements }
}

/// Rebuilds the structured path from a flat trace.
pub fn trace_to_path(trace: &LeakTrace) -> Result<LeakTracePath, ClusterError> {
    trace.validate()?;
    let mut elements = trace.elements.iter();
    let root = match elements.next() {
        Some(TraceElement::Node(node)) => node.clone(),
        _ => {
            return Err(ClusterError::MalformedTrace {
                reason: "trace is empty".to_string(),
            })
        }
    };
    let mut hops = Vec::with_capacity(trace.len() / 2);
    while let (Some(TraceElement::Edge(edge)), Some(TraceElement::Node(node))) =
        (elements.next(), elements.next())
    {
        hops.push((edge.clone(), node.clone()));
    }
    Ok(LeakTracePath { root, hops })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, name: &str) -> NodeRecord {
        NodeRecord {
            id,
            name: name.to_string(),
            node_type: "object".to_string(),
            self_size: 8,
            retained_size: Some(8.0),
            detached: false,
        }
    }

    fn edge(name: &str) -> EdgeRecord {
        EdgeRecord {
            name_or_index: EdgeLabel::Name(name.to_string()),
            edge_type: "property".to_string(),
        }
    }

    fn sample_path() -> LeakTracePath {
        let mut detached = node(7, "Detached HTMLDivElement");
        detached.detached = true;
        LeakTracePath {
            root: node(1, "Window"),
            hops: vec![
                (edge("app"), node(3, "App")),
                (edge("el"), detached),
                (
                    EdgeRecord {
                        name_or_index: EdgeLabel::Index(0),
                        edge_type: "element".to_string(),
                    },
                    node(9, "HTMLSpanElement"),
                ),
            ],
        }
    }

    #[test]
    fn path_and_trace_round_trip() {
        let path = sample_path();
        let trace = path_to_trace(&path, false);
        assert_eq!(trace.len(), 7);
        let back = trace_to_path(&trace).unwrap();
        assert_eq!(back, path);
        assert_eq!(path_to_trace(&back, false), trace);
        assert_eq!(back.leaked_node().id, 9);
    }

    #[test]
    fn truncation_stops_at_first_detached_node() {
        let trace = path_to_trace(&sample_path(), true);
        assert_eq!(trace.len(), 5);
        assert_eq!(trace.last_node().unwrap().name, "Detached HTMLDivElement");
    }

    #[test]
    fn json_shape_is_tagged_records() {
        let trace = path_to_trace(&sample_path(), false);
        let json = trace.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["kind"], "node");
        assert_eq!(value[0]["type"], "object");
        assert_eq!(value[1]["kind"], "edge");
        assert_eq!(value[1]["name_or_index"], "app");
        assert_eq!(value[5]["name_or_index"], 0);
        assert_eq!(LeakTrace::from_json(&json).unwrap(), trace);
    }

    #[test]
    fn malformed_traces_are_rejected() {
        let ends_with_edge = LeakTrace::new(vec![
            TraceElement::Node(node(1, "A")),
            TraceElement::Edge(edge("x")),
        ]);
        assert!(matches!(
            ends_with_edge.validate(),
            Err(ClusterError::MalformedTrace { .. })
        ));
        let two_nodes = LeakTrace::new(vec![
            TraceElement::Node(node(1, "A")),
            TraceElement::Node(node(2, "B")),
        ]);
        assert!(trace_to_path(&two_nodes).is_err());
        assert!(trace_to_path(&LeakTrace::default()).is_err());
        assert!(LeakTrace::from_json(r#"[{"kind":"edge","name_or_index":"x","type":"property"}]"#)
            .is_err());
    }

    #[test]
    fn fingerprint_ignores_ids_and_sizes() {
        let a = path_to_trace(&sample_path(), false);
        let mut b = a.clone();
        if let TraceElement::Node(n) = &mut b.elements[2] {
            n.id = 999;
            n.self_size = 1;
        }
        assert_eq!(a.fingerprint(), b.fingerprint());
        if let TraceElement::Node(n) = &mut b.elements[2] {
            n.name = "Other".to_string();
        }
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
