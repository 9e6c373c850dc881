//! HeapSnapshot: the compact indexed graph store.
//!
//! [`HeapSnapshot`] owns the raw flattened arrays of a heap snapshot and the
//! index structures built over them once at load time:
//!
//! - `first_edge`: per-node prefix sum of edge fields (length `nodes + 1`,
//!   sentinel equal to the edge array length).
//! - Retainer index: a counting sort of all edges by target node, giving a
//!   compact `slot -> edge` array bounded by `first_retainer`, plus an
//!   `edge -> source node` array. Together they are the exact inverse of the
//!   forward edge index.
//! - `id -> index` map and `node -> location` map.
//!
//! Derived per-node state (detachedness, dominators, retained sizes, path
//! edges, attribute flags) lives in scratch arrays sized once here and filled
//! in by the analysis passes in [`crate::detached`], [`crate::dominator`] and
//! [`crate::path`]. Nodes and edges are never materialized as owned objects;
//! [`HeapNode`] and [`HeapEdge`] are `(store, index)` views.

use std::collections::HashMap;
use std::ops::Range;

use tracing::{debug, warn};

use crate::edge::{EdgeName, HeapEdge};
use crate::error::SnapshotError;
use crate::id::{EdgeIndex, NodeIndex};
use crate::node::{Detachedness, HeapNode, NodeAttributes, NodeLocation};
use crate::raw::RawSnapshot;
use crate::schema::{is_type, SnapshotLayout};

/// Sentinel for "no entry" in `u32` scratch arrays.
pub(crate) const NO_ENTRY: u32 = u32::MAX;

/// Class name of the object tagging store injected by test instrumentation.
pub const TAGGED_STORE_CLASS: &str = "MemLabTaggedStore";

/// The indexed heap graph.
#[derive(Debug, Clone)]
pub struct HeapSnapshot {
    pub(crate) layout: SnapshotLayout,
    pub(crate) nodes: Vec<u64>,
    pub(crate) edges: Vec<u64>,
    locations: Vec<u64>,
    strings: Vec<String>,
    node_count: usize,
    edge_count: usize,
    /// Edge field offset of each node's first edge; `node_count + 1` entries.
    pub(crate) first_edge: Vec<usize>,
    /// Retainer slot range of each node; `node_count + 1` entries.
    pub(crate) first_retainer: Vec<u32>,
    /// Retainer slot -> edge ordinal.
    pub(crate) retaining_edges: Vec<u32>,
    /// Edge ordinal -> source node ordinal.
    pub(crate) edge_from_node: Vec<u32>,
    id_to_index: HashMap<u64, u32>,
    /// Node ordinal -> location ordinal.
    location_index: Vec<u32>,
    pub(crate) detachedness: Vec<u8>,
    pub(crate) retained_sizes: Vec<f64>,
    /// Node ordinal -> dominator node ordinal.
    pub(crate) dominators: Vec<u32>,
    pub(crate) dominators_computed: bool,
    /// Node ordinal -> edge ordinal of the preferred parent edge.
    pub(crate) path_edges: Vec<u32>,
    attributes: Vec<u8>,
    processed: bool,
}

impl HeapSnapshot {
    /// Builds the store from parsed arrays.
    ///
    /// Fails fast on corrupt input: record arrays that are not a whole number
    /// of records, edge counts that disagree with the edge array, edge target
    /// pointers not aligned to the node width, and out-of-range string
    /// references.
    pub fn from_raw(raw: RawSnapshot) -> Result<Self, SnapshotError> {
        let RawSnapshot {
            meta,
            nodes,
            edges,
            locations,
            strings,
        } = raw;
        let layout = SnapshotLayout::resolve(&meta)?;

        let node_width = layout.node.width;
        let edge_width = layout.edge.width;
        if nodes.len() % node_width != 0 {
            return Err(SnapshotError::RecordLength {
                kind: "node",
                len: nodes.len(),
                width: node_width,
            });
        }
        if edges.len() % edge_width != 0 {
            return Err(SnapshotError::RecordLength {
                kind: "edge",
                len: edges.len(),
                width: edge_width,
            });
        }
        if let Some(loc) = &layout.location {
            if locations.len() % loc.width != 0 {
                return Err(SnapshotError::RecordLength {
                    kind: "location",
                    len: locations.len(),
                    width: loc.width,
                });
            }
        }

        let node_count = nodes.len() / node_width;
        let edge_count = edges.len() / edge_width;
        debug!(node_count, edge_count, "building heap snapshot indices");

        let edge_count_of =
            |ordinal: usize| nodes[ordinal * node_width + layout.node.edge_count_offset];
        let declared = (0..node_count).fold(0usize, |sum, ordinal| {
            sum.saturating_add(usize::try_from(edge_count_of(ordinal)).unwrap_or(usize::MAX))
        });
        if declared != edge_count {
            return Err(SnapshotError::EdgeCountMismatch {
                declared,
                actual: edge_count,
            });
        }

        // Forward index: prefix sum of edge counts, scaled to edge fields.
        // Bounded by `edges.len()` once the declared total matches.
        let mut first_edge = Vec::with_capacity(node_count + 1);
        let mut offset = 0usize;
        for ordinal in 0..node_count {
            first_edge.push(offset);
            offset += edge_count_of(ordinal) as usize * edge_width;
        }
        first_edge.push(offset);

        // Validate edge targets and names before anything indexes through them.
        let to_offset = layout.edge.to_node_offset;
        let name_offset = layout.edge.name_or_index_offset;
        let type_offset = layout.edge.type_offset;
        for edge in 0..edge_count {
            let base = edge * edge_width;
            let target = edges[base + to_offset];
            if target % node_width as u64 != 0 || (target / node_width as u64) as usize >= node_count
            {
                return Err(SnapshotError::MisalignedEdgeTarget { edge, target });
            }
            let edge_type = edges[base + type_offset];
            let indexed = is_type(edge_type, layout.edge_type_ids.element)
                || is_type(edge_type, layout.edge_type_ids.hidden);
            let name = edges[base + name_offset];
            if !indexed && name as usize >= strings.len() {
                return Err(SnapshotError::StringIndex {
                    index: name,
                    len: strings.len(),
                });
            }
        }
        for ordinal in 0..node_count {
            let name = nodes[ordinal * node_width + layout.node.name_offset];
            if name as usize >= strings.len() {
                return Err(SnapshotError::StringIndex {
                    index: name,
                    len: strings.len(),
                });
            }
        }

        // Retainer index via counting sort over edge targets.
        let mut first_retainer = vec![0u32; node_count + 1];
        for edge in 0..edge_count {
            let target = (edges[edge * edge_width + to_offset] / node_width as u64) as usize;
            first_retainer[target] += 1;
        }
        let mut running = 0u32;
        for slot in first_retainer.iter_mut() {
            let count = *slot;
            *slot = running;
            running += count;
        }
        let mut cursor: Vec<u32> = first_retainer[..node_count].to_vec();
        let mut retaining_edges = vec![0u32; edge_count];
        let mut edge_from_node = vec![0u32; edge_count];
        for source in 0..node_count {
            let begin = first_edge[source] / edge_width;
            let end = first_edge[source + 1] / edge_width;
            for edge in begin..end {
                let target = (edges[edge * edge_width + to_offset] / node_width as u64) as usize;
                retaining_edges[cursor[target] as usize] = edge as u32;
                cursor[target] += 1;
                edge_from_node[edge] = source as u32;
            }
        }

        let mut id_to_index = HashMap::with_capacity(node_count);
        for ordinal in 0..node_count {
            let id = nodes[ordinal * node_width + layout.node.id_offset];
            id_to_index.insert(id, ordinal as u32);
        }

        let mut location_index = vec![NO_ENTRY; node_count];
        if let Some(loc) = &layout.location {
            let mut skipped = 0usize;
            for location in 0..locations.len() / loc.width {
                let object = locations[location * loc.width + loc.object_index_offset];
                let ordinal = (object / node_width as u64) as usize;
                if object % node_width as u64 != 0 || ordinal >= node_count {
                    skipped += 1;
                    continue;
                }
                location_index[ordinal] = location as u32;
            }
            if skipped > 0 {
                warn!(skipped, "ignored locations pointing outside the node array");
            }
        }

        let detachedness = match layout.node.detachedness_offset {
            Some(off) => (0..node_count)
                .map(|ordinal| nodes[ordinal * node_width + off] as u8)
                .collect(),
            None => vec![Detachedness::Unknown as u8; node_count],
        };

        Ok(HeapSnapshot {
            layout,
            nodes,
            edges,
            locations,
            strings,
            node_count,
            edge_count,
            first_edge,
            first_retainer,
            retaining_edges,
            edge_from_node,
            id_to_index,
            location_index,
            detachedness,
            retained_sizes: vec![0.0; node_count],
            dominators: vec![NO_ENTRY; node_count],
            dominators_computed: false,
            path_edges: vec![NO_ENTRY; node_count],
            attributes: vec![0; node_count],
            processed: false,
        })
    }

    /// Decodes and indexes a `.heapsnapshot` JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, SnapshotError> {
        Self::from_raw(RawSnapshot::from_json_str(json)?)
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Returns the resolved schema layout.
    pub fn layout(&self) -> &SnapshotLayout {
        &self.layout
    }

    /// Whether the schema carries a per-node detachedness field.
    pub fn has_detachedness_field(&self) -> bool {
        self.layout.node.detachedness_offset.is_some()
    }

    /// The designated root node (ordinal 0).
    pub fn root_index(&self) -> NodeIndex {
        NodeIndex(0)
    }

    /// Returns a view of the node at `index`, if it exists.
    pub fn node(&self, index: NodeIndex) -> Option<HeapNode<'_>> {
        (index.index() < self.node_count).then(|| HeapNode::new(self, index))
    }

    /// Returns a view of the edge at `index`, if it exists.
    pub fn edge(&self, index: EdgeIndex) -> Option<HeapEdge<'_>> {
        (index.index() < self.edge_count).then(|| HeapEdge::new(self, index))
    }

    /// Looks a node up by its snapshot id.
    pub fn node_by_id(&self, id: u64) -> Option<HeapNode<'_>> {
        self.id_to_index
            .get(&id)
            .map(|&ordinal| HeapNode::new(self, NodeIndex(ordinal)))
    }

    /// Maps a snapshot id to its dense index.
    pub fn index_of_id(&self, id: u64) -> Option<NodeIndex> {
        self.id_to_index.get(&id).map(|&ordinal| NodeIndex(ordinal))
    }

    /// Iterates all nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = HeapNode<'_>> + '_ {
        (0..self.node_count as u32).map(move |i| HeapNode::new(self, NodeIndex(i)))
    }

    /// Iterates all edges in index order.
    pub fn edges(&self) -> impl Iterator<Item = HeapEdge<'_>> + '_ {
        (0..self.edge_count as u32).map(move |i| HeapEdge::new(self, EdgeIndex(i)))
    }

    /// Sum of all node self sizes.
    pub fn total_self_size(&self) -> u64 {
        self.nodes().map(|n| n.self_size()).sum()
    }

    /// Whether the full analysis pipeline already ran on this store.
    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub(crate) fn set_processed(&mut self, processed: bool) {
        self.processed = processed;
    }

    // -----------------------------------------------------------------------
    // Attribute flags
    // -----------------------------------------------------------------------

    /// Sets `flags` on a node, keeping any flags already present.
    pub fn add_attributes(&mut self, index: NodeIndex, flags: NodeAttributes) {
        if let Some(slot) = self.attributes.get_mut(index.index()) {
            *slot |= flags.bits();
        }
    }

    /// Clears `flags` on a node.
    pub fn remove_attributes(&mut self, index: NodeIndex, flags: NodeAttributes) {
        if let Some(slot) = self.attributes.get_mut(index.index()) {
            *slot &= !flags.bits();
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// All non-string nodes whose (undecorated) name equals `class_name`.
    ///
    /// String nodes are skipped because their name is their content.
    pub fn nodes_by_name(&self, class_name: &str) -> Vec<HeapNode<'_>> {
        self.nodes()
            .filter(|n| !n.is_string() && n.raw_name() == class_name)
            .collect()
    }

    /// The first non-string node whose name equals `class_name`.
    pub fn any_node_with_name(&self, class_name: &str) -> Option<HeapNode<'_>> {
        self.nodes()
            .find(|n| !n.is_string() && n.raw_name() == class_name)
    }

    /// All nodes holding a `property` edge named `property`.
    pub fn nodes_with_property(&self, property: &str) -> Vec<HeapNode<'_>> {
        self.nodes()
            .filter(|n| n.reference_node(property, Some("property")).is_some())
            .collect()
    }

    /// The first node holding a `property` edge named `property`.
    pub fn any_node_with_property(&self, property: &str) -> Option<HeapNode<'_>> {
        self.nodes()
            .find(|n| n.reference_node(property, Some("property")).is_some())
    }

    /// Whether an object tagged with `tag` is still alive in this heap.
    ///
    /// Follows `MemLabTaggedStore.taggedObjects[tag]`, a WeakSet, to its
    /// backing `table` and reports whether the table still holds any
    /// non-hidden object.
    pub fn has_object_with_tag(&self, tag: &str) -> bool {
        let Some(store) = self.any_node_with_name(TAGGED_STORE_CLASS) else {
            return false;
        };
        let table = store
            .reference_node("taggedObjects", None)
            .and_then(|tagged| tagged.reference_node(tag, None))
            .and_then(|weak_set| weak_set.reference_node("table", None));
        match table {
            Some(table) => table
                .find_any_reference(|edge| !edge.to_node().is_hidden())
                .is_some(),
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Raw record access (crate-internal)
    // -----------------------------------------------------------------------

    #[inline]
    pub(crate) fn node_field(&self, ordinal: usize, offset: usize) -> u64 {
        self.nodes[ordinal * self.layout.node.width + offset]
    }

    #[inline]
    pub(crate) fn edge_field(&self, ordinal: usize, offset: usize) -> u64 {
        self.edges[ordinal * self.layout.edge.width + offset]
    }

    #[inline]
    pub(crate) fn node_type_value(&self, ordinal: usize) -> u64 {
        self.node_field(ordinal, self.layout.node.type_offset)
    }

    #[inline]
    pub(crate) fn edge_type_value(&self, edge: usize) -> u64 {
        self.edge_field(edge, self.layout.edge.type_offset)
    }

    /// Target node ordinal of an edge.
    #[inline]
    pub(crate) fn edge_target(&self, edge: usize) -> usize {
        (self.edge_field(edge, self.layout.edge.to_node_offset) / self.layout.node.width as u64)
            as usize
    }

    /// Edge ordinals of a node's outgoing references.
    #[inline]
    pub(crate) fn edge_range(&self, ordinal: usize) -> Range<usize> {
        let width = self.layout.edge.width;
        self.first_edge[ordinal] / width..self.first_edge[ordinal + 1] / width
    }

    /// Retainer slots of a node; map through `retaining_edges`.
    #[inline]
    pub(crate) fn retainer_range(&self, ordinal: usize) -> Range<usize> {
        self.first_retainer[ordinal] as usize..self.first_retainer[ordinal + 1] as usize
    }

    #[inline]
    pub(crate) fn string(&self, index: u64) -> &str {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub(crate) fn edge_name(&self, edge: usize) -> EdgeName<'_> {
        let value = self.edge_field(edge, self.layout.edge.name_or_index_offset);
        if self.edge_is_indexed(edge) {
            EdgeName::Index(value)
        } else {
            EdgeName::Name(self.string(value))
        }
    }

    #[inline]
    pub(crate) fn edge_is_indexed(&self, edge: usize) -> bool {
        let t = self.edge_type_value(edge);
        is_type(t, self.layout.edge_type_ids.element) || is_type(t, self.layout.edge_type_ids.hidden)
    }

    #[inline]
    pub(crate) fn attribute_bits(&self, ordinal: usize) -> u8 {
        self.attributes[ordinal]
    }

    pub(crate) fn location_of(&self, ordinal: usize) -> Option<NodeLocation> {
        let layout = self.layout.location.as_ref()?;
        let location = *self.location_index.get(ordinal)?;
        if location == NO_ENTRY {
            return None;
        }
        let base = location as usize * layout.width;
        Some(NodeLocation {
            script_id: self.locations[base + layout.script_id_offset],
            line: self.locations[base + layout.line_offset],
            column: self.locations[base + layout.column_offset],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::SnapshotMeta;
    use crate::testing::SnapshotBuilder;

    #[test]
    fn indices_match_schema_counts() {
        let mut b = SnapshotBuilder::new();
        let root = b.node("synthetic", "", 0);
        let a = b.node("object", "A", 10);
        let c = b.node("object", "C", 5);
        b.edge(root, a, "property", "a");
        b.edge(a, c, "property", "c");
        b.edge(root, c, "element", "0");
        let snapshot = b.build().unwrap();

        assert_eq!(snapshot.node_count(), 3);
        assert_eq!(snapshot.edge_count(), 3);
        assert_eq!(snapshot.first_edge.len(), 4);
        assert_eq!(*snapshot.first_edge.last().unwrap(), snapshot.edges.len());
        assert_eq!(snapshot.total_self_size(), 15);
    }

    #[test]
    fn retainer_index_is_inverse_of_forward_index() {
        let mut b = SnapshotBuilder::new();
        let root = b.node("synthetic", "", 0);
        let a = b.node("object", "A", 1);
        let c = b.node("object", "C", 1);
        b.edge(root, a, "property", "a");
        b.edge(root, c, "property", "c");
        b.edge(a, c, "property", "c");
        b.edge(c, a, "property", "back");
        let snapshot = b.build().unwrap();

        for edge in snapshot.edges() {
            let target = edge.to_node();
            let hits = target
                .referrers()
                .filter(|r| r.index() == edge.index())
                .count();
            assert_eq!(hits, 1);
        }
        for node in snapshot.nodes() {
            for retainer in node.referrers() {
                assert_eq!(retainer.to_index(), node.index());
            }
        }
        let a_node = snapshot.node_by_id(a.id).unwrap();
        let sources: Vec<&str> = a_node.referrers().map(|e| e.from_node().raw_name()).collect();
        assert_eq!(sources, vec!["", "C"]);
    }

    #[test]
    fn misaligned_edge_target_fails_fast() {
        let meta = SnapshotMeta::v8_default();
        // Two synthetic nodes, node 0 has one edge whose to_node is 3 (width 7).
        let nodes = vec![9, 0, 1, 0, 1, 0, 0, 9, 0, 3, 0, 0, 0, 0];
        let edges = vec![2, 0, 3];
        let raw = RawSnapshot::from_parts(meta, nodes, edges, vec![], vec!["".into()]);
        match HeapSnapshot::from_raw(raw) {
            Err(SnapshotError::MisalignedEdgeTarget { edge, target }) => {
                assert_eq!(edge, 0);
                assert_eq!(target, 3);
            }
            other => panic!("expected misaligned edge error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn edge_count_mismatch_is_corrupt_input() {
        let meta = SnapshotMeta::v8_default();
        let nodes = vec![9, 0, 1, 0, 2, 0, 0];
        let edges = vec![2, 0, 0];
        let raw = RawSnapshot::from_parts(meta, nodes, edges, vec![], vec!["".into()]);
        assert!(matches!(
            HeapSnapshot::from_raw(raw),
            Err(SnapshotError::EdgeCountMismatch {
                declared: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn oversized_edge_count_is_corrupt_input() {
        let meta = SnapshotMeta::v8_default();
        let nodes = vec![9, 0, 1, 0, u64::MAX, 0, 0, 3, 0, 3, 0, 2, 0, 0];
        let edges = vec![2, 0, 0];
        let raw = RawSnapshot::from_parts(meta, nodes, edges, vec![], vec!["".into()]);
        assert!(matches!(
            HeapSnapshot::from_raw(raw),
            Err(SnapshotError::EdgeCountMismatch {
                declared: usize::MAX,
                actual: 1
            })
        ));
    }

    #[test]
    fn node_record_length_checked() {
        let meta = SnapshotMeta::v8_default();
        let raw = RawSnapshot::from_parts(meta, vec![0; 6], vec![], vec![], vec!["".into()]);
        assert!(matches!(
            HeapSnapshot::from_raw(raw),
            Err(SnapshotError::RecordLength { kind: "node", .. })
        ));
    }

    #[test]
    fn bad_string_reference_fails() {
        let meta = SnapshotMeta::v8_default();
        let nodes = vec![9, 4, 1, 0, 0, 0, 0];
        let raw = RawSnapshot::from_parts(meta, nodes, vec![], vec![], vec!["".into()]);
        assert!(matches!(
            HeapSnapshot::from_raw(raw),
            Err(SnapshotError::StringIndex { index: 4, len: 1 })
        ));
    }

    #[test]
    fn lookup_by_id_and_queries() {
        let mut b = SnapshotBuilder::new();
        let root = b.node("synthetic", "", 0);
        let store = b.node("object", "Store", 8);
        let item = b.node("object", "Item", 4);
        let text = b.node("string", "Store", 4);
        b.edge(root, store, "property", "store");
        b.edge(store, item, "property", "current");
        b.edge(store, text, "property", "label");
        let snapshot = b.build().unwrap();

        assert_eq!(snapshot.node_by_id(item.id).unwrap().raw_name(), "Item");
        assert!(snapshot.node_by_id(999_999).is_none());
        assert_eq!(snapshot.nodes_by_name("Store").len(), 1);
        assert_eq!(snapshot.any_node_with_name("Item").unwrap().id(), item.id);
        let holders = snapshot.nodes_with_property("current");
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].raw_name(), "Store");
        assert!(snapshot.any_node_with_property("missing").is_none());
    }

    #[test]
    fn tagged_object_lookup() {
        let mut b = SnapshotBuilder::new();
        let root = b.node("synthetic", "", 0);
        let store = b.node("object", TAGGED_STORE_CLASS, 16);
        let tagged = b.node("object", "Object", 16);
        let weak_set = b.node("object", "WeakSet", 16);
        let table = b.node("array", "(object elements)", 16);
        let target = b.node("object", "Widget", 16);
        let empty_set = b.node("object", "WeakSet", 16);
        let empty_table = b.node("array", "(object elements)", 16);
        let oddball = b.node("hidden", "system / Oddball", 0);
        b.edge(root, store, "property", "store");
        b.edge(store, tagged, "property", "taggedObjects");
        b.edge(tagged, weak_set, "property", "leaky");
        b.edge(tagged, empty_set, "property", "clean");
        b.edge(weak_set, table, "internal", "table");
        b.edge(table, target, "weak", "1");
        b.edge(empty_set, empty_table, "internal", "table");
        b.edge(empty_table, oddball, "hidden", "0");
        let snapshot = b.build().unwrap();

        assert!(snapshot.has_object_with_tag("leaky"));
        assert!(!snapshot.has_object_with_tag("clean"));
        assert!(!snapshot.has_object_with_tag("never-registered"));
    }

    #[test]
    fn attributes_are_settable_post_hoc() {
        let mut b = SnapshotBuilder::new();
        b.node("synthetic", "", 0);
        let a = b.node("object", "A", 1);
        let mut snapshot = b.build().unwrap();
        let idx = snapshot.index_of_id(a.id).unwrap();

        snapshot.add_attributes(idx, NodeAttributes::LEAKED | NodeAttributes::HIGHLIGHTED);
        let flags = snapshot.node(idx).unwrap().attributes();
        assert!(flags.contains(NodeAttributes::LEAKED));
        assert!(flags.contains(NodeAttributes::HIGHLIGHTED));

        snapshot.remove_attributes(idx, NodeAttributes::HIGHLIGHTED);
        let flags = snapshot.node(idx).unwrap().attributes();
        assert!(flags.contains(NodeAttributes::LEAKED));
        assert!(!flags.contains(NodeAttributes::HIGHLIGHTED));
    }

    #[test]
    fn locations_map_to_nodes() {
        let mut b = SnapshotBuilder::new();
        b.node("synthetic", "", 0);
        let f = b.node("closure", "onClick", 32);
        b.location(f, 7, 120, 4);
        let snapshot = b.build().unwrap();
        let node = snapshot.node_by_id(f.id).unwrap();
        let loc = node.location().unwrap();
        assert_eq!((loc.script_id, loc.line, loc.column), (7, 120, 4));
        assert!(snapshot.node(snapshot.root_index()).unwrap().location().is_none());
    }

    #[test]
    fn json_snapshot_loads() {
        let json = r#"{
            "snapshot": {"meta": {
                "node_fields": ["type","name","id","self_size","edge_count"],
                "node_types": [["synthetic","object"],"string","number","number","number"],
                "edge_fields": ["type","name_or_index","to_node"],
                "edge_types": [["element","property","weak"],"string_or_number","node"]
            }},
            "nodes": [0,0,1,0,1, 1,1,3,16,0],
            "edges": [1,2,5],
            "strings": ["", "Foo", "bar"]
        }"#;
        let snapshot = HeapSnapshot::from_json_str(json).unwrap();
        let foo = snapshot.node_by_id(3).unwrap();
        assert_eq!(foo.raw_name(), "Foo");
        assert_eq!(foo.self_size(), 16);
        let edge = snapshot.edge(EdgeIndex(0)).unwrap();
        assert_eq!(edge.name_or_index().to_string(), "bar");
        assert_eq!(edge.to_node().id(), 3);
        assert!(!snapshot.has_detachedness_field());
    }
}
