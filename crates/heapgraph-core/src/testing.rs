//! In-memory snapshot builder for tests.
//!
//! [`SnapshotBuilder`] assembles the flat V8-schema arrays from a node/edge
//! description, so graph fixtures can be written without hand-computing
//! field offsets. Node ids follow V8's odd-number convention.

use std::collections::HashMap;

use crate::error::SnapshotError;
use crate::node::Detachedness;
use crate::raw::{RawSnapshot, SnapshotMeta};
use crate::schema::SnapshotLayout;
use crate::snapshot::HeapSnapshot;

/// Handle to a node added to a [`SnapshotBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub ordinal: usize,
    pub id: u64,
}

struct PendingNode {
    node_type: String,
    name: String,
    self_size: u64,
    detachedness: Detachedness,
    edges: Vec<PendingEdge>,
}

struct PendingEdge {
    edge_type: String,
    name: String,
    to: usize,
}

/// Builds a [`HeapSnapshot`] over the default V8 schema.
pub struct SnapshotBuilder {
    meta: SnapshotMeta,
    nodes: Vec<PendingNode>,
    locations: Vec<(usize, u64, u64, u64)>,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        SnapshotBuilder {
            meta: SnapshotMeta::v8_default(),
            nodes: Vec::new(),
            locations: Vec::new(),
        }
    }

    /// Drops the `detachedness` field from the emitted schema.
    pub fn without_detachedness(mut self) -> Self {
        if let Some(pos) = self.meta.node_fields.iter().position(|f| f == "detachedness") {
            self.meta.node_fields.remove(pos);
            self.meta.node_types.remove(pos);
        }
        self
    }

    /// Adds a node. The first node added is the snapshot root.
    pub fn node(&mut self, node_type: &str, name: &str, self_size: u64) -> NodeHandle {
        let ordinal = self.nodes.len();
        self.nodes.push(PendingNode {
            node_type: node_type.to_string(),
            name: name.to_string(),
            self_size,
            detachedness: Detachedness::Unknown,
            edges: Vec::new(),
        });
        NodeHandle {
            ordinal,
            id: Self::id_for(ordinal),
        }
    }

    /// Adds an edge. For `element` and `hidden` edges `name` must be numeric.
    pub fn edge(&mut self, from: NodeHandle, to: NodeHandle, edge_type: &str, name: &str) {
        self.nodes[from.ordinal].edges.push(PendingEdge {
            edge_type: edge_type.to_string(),
            name: name.to_string(),
            to: to.ordinal,
        });
    }

    /// Sets the raw detachedness state of a node.
    pub fn detachedness(&mut self, node: NodeHandle, state: Detachedness) {
        self.nodes[node.ordinal].detachedness = state;
    }

    /// Attaches a source location to a node.
    pub fn location(&mut self, node: NodeHandle, script_id: u64, line: u64, column: u64) {
        self.locations.push((node.ordinal, script_id, line, column));
    }

    pub fn id_for(ordinal: usize) -> u64 {
        ordinal as u64 * 2 + 1
    }

    /// Produces the raw arrays without indexing them.
    pub fn build_raw(self) -> Result<RawSnapshot, SnapshotError> {
        let layout = SnapshotLayout::resolve(&self.meta)?;
        let node_width = layout.node.width;
        let edge_width = layout.edge.width;

        let mut strings: Vec<String> = Vec::new();
        let mut interned: HashMap<String, u64> = HashMap::new();
        let mut intern = |s: &str| -> u64 {
            if let Some(&i) = interned.get(s) {
                return i;
            }
            let i = strings.len() as u64;
            strings.push(s.to_string());
            interned.insert(s.to_string(), i);
            i
        };
        intern("");

        let mut nodes = vec![0u64; self.nodes.len() * node_width];
        let mut edges = Vec::new();
        for (ordinal, node) in self.nodes.iter().enumerate() {
            let base = ordinal * node_width;
            let type_value =
                layout
                    .node_types
                    .index_of(&node.node_type)
                    .ok_or_else(|| SnapshotError::MissingType {
                        kind: "node",
                        name: node.node_type.clone(),
                    })?;
            nodes[base + layout.node.type_offset] = type_value;
            nodes[base + layout.node.name_offset] = intern(&node.name);
            nodes[base + layout.node.id_offset] = Self::id_for(ordinal);
            nodes[base + layout.node.self_size_offset] = node.self_size;
            nodes[base + layout.node.edge_count_offset] = node.edges.len() as u64;
            if let Some(off) = layout.node.detachedness_offset {
                nodes[base + off] = node.detachedness as u64;
            }

            for edge in &node.edges {
                let type_value = layout.edge_types.index_of(&edge.edge_type).ok_or_else(|| {
                    SnapshotError::MissingType {
                        kind: "edge",
                        name: edge.edge_type.clone(),
                    }
                })?;
                let indexed = edge.edge_type == "element" || edge.edge_type == "hidden";
                let name_value = if indexed {
                    edge.name.parse::<u64>().unwrap_or(0)
                } else {
                    intern(&edge.name)
                };
                let mut record = vec![0u64; edge_width];
                record[layout.edge.type_offset] = type_value;
                record[layout.edge.name_or_index_offset] = name_value;
                record[layout.edge.to_node_offset] = (edge.to * node_width) as u64;
                edges.extend(record);
            }
        }

        let mut locations = Vec::new();
        if let Some(loc) = &layout.location {
            for &(ordinal, script_id, line, column) in &self.locations {
                let mut record = vec![0u64; loc.width];
                record[loc.object_index_offset] = (ordinal * node_width) as u64;
                record[loc.script_id_offset] = script_id;
                record[loc.line_offset] = line;
                record[loc.column_offset] = column;
                locations.extend(record);
            }
        }

        Ok(RawSnapshot::from_parts(
            self.meta, nodes, edges, locations, strings,
        ))
    }

    /// Produces an indexed snapshot.
    pub fn build(self) -> Result<HeapSnapshot, SnapshotError> {
        HeapSnapshot::from_raw(self.build_raw()?)
    }
}
