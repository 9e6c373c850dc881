//! Node views over the snapshot's flat node records.
//!
//! A [`HeapNode`] is a `(store, index)` pair; every accessor reads straight
//! from the store's arrays. Views are `Copy` and cost nothing to create.

use std::borrow::Cow;
use std::fmt;
use std::ops::{BitOr, ControlFlow};

use serde::{Deserialize, Serialize};

use crate::edge::HeapEdge;
use crate::error::SnapshotError;
use crate::id::{EdgeIndex, NodeIndex};
use crate::schema::is_type;
use crate::snapshot::{HeapSnapshot, NO_ENTRY};

/// Prefix the engine adds to names of detached native objects.
pub const DETACHED_PREFIX: &str = "Detached ";

/// Whether a native object is still connected to the live document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Detachedness {
    Unknown = 0,
    Attached = 1,
    Detached = 2,
}

impl Detachedness {
    /// Decodes the raw field value; anything out of range is `Unknown`.
    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => Detachedness::Attached,
            2 => Detachedness::Detached,
            _ => Detachedness::Unknown,
        }
    }
}

/// Derived classification flags, settable after load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAttributes(u8);

impl NodeAttributes {
    pub const NONE: NodeAttributes = NodeAttributes(0);
    /// Marked as leaked by a leak filter.
    pub const LEAKED: NodeAttributes = NodeAttributes(1);
    /// Marked for emphasis in reports.
    pub const HIGHLIGHTED: NodeAttributes = NodeAttributes(1 << 1);
    /// A detached DOM element identified by the leak filter chain.
    pub const DETACHED_DOM: NodeAttributes = NodeAttributes(1 << 2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        NodeAttributes(bits)
    }

    pub fn contains(self, other: NodeAttributes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for NodeAttributes {
    type Output = NodeAttributes;

    fn bitor(self, rhs: NodeAttributes) -> NodeAttributes {
        NodeAttributes(self.0 | rhs.0)
    }
}

/// Source position of a closure or script-allocated object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLocation {
    pub script_id: u64,
    pub line: u64,
    pub column: u64,
}

/// A view of one node record.
#[derive(Clone, Copy)]
pub struct HeapNode<'a> {
    snapshot: &'a HeapSnapshot,
    index: NodeIndex,
}

impl<'a> HeapNode<'a> {
    pub(crate) fn new(snapshot: &'a HeapSnapshot, index: NodeIndex) -> Self {
        HeapNode { snapshot, index }
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn snapshot(&self) -> &'a HeapSnapshot {
        self.snapshot
    }

    fn field(&self, offset: usize) -> u64 {
        self.snapshot.node_field(self.index.index(), offset)
    }

    pub fn id(&self) -> u64 {
        self.field(self.snapshot.layout.node.id_offset)
    }

    pub fn type_name(&self) -> &'a str {
        let value = self.field(self.snapshot.layout.node.type_offset);
        self.snapshot.layout.node_types.name(value)
    }

    /// The name exactly as stored in the string table.
    pub fn raw_name(&self) -> &'a str {
        let value = self.field(self.snapshot.layout.node.name_offset);
        self.snapshot.string(value)
    }

    /// Display name; detached nodes carry the `Detached ` prefix.
    pub fn name(&self) -> Cow<'a, str> {
        let raw = self.raw_name();
        if self.detachedness() == Detachedness::Detached && !raw.starts_with(DETACHED_PREFIX) {
            Cow::Owned(format!("{DETACHED_PREFIX}{raw}"))
        } else {
            Cow::Borrowed(raw)
        }
    }

    pub fn self_size(&self) -> u64 {
        self.field(self.snapshot.layout.node.self_size_offset)
    }

    pub fn edge_count(&self) -> usize {
        self.field(self.snapshot.layout.node.edge_count_offset) as usize
    }

    pub fn trace_node_id(&self) -> Option<u64> {
        self.snapshot
            .layout
            .node
            .trace_node_id_offset
            .map(|off| self.field(off))
    }

    /// Propagated detachedness; `Unknown` when the schema has no such field.
    pub fn detachedness(&self) -> Detachedness {
        Detachedness::from_raw(self.snapshot.detachedness[self.index.index()])
    }

    /// Whether the node is detached from the document.
    ///
    /// Uses the detachedness field when present and falls back to the
    /// `Detached ` name prefix otherwise.
    pub fn is_detached(&self) -> bool {
        if self.snapshot.has_detachedness_field() {
            self.detachedness() == Detachedness::Detached
        } else {
            self.raw_name().starts_with(DETACHED_PREFIX)
        }
    }

    fn has_type(&self, type_id: Option<u64>) -> bool {
        is_type(self.snapshot.node_type_value(self.index.index()), type_id)
    }

    pub fn is_native(&self) -> bool {
        self.has_type(self.snapshot.layout.node_type_ids.native)
    }

    pub fn is_synthetic(&self) -> bool {
        self.has_type(self.snapshot.layout.node_type_ids.synthetic)
    }

    pub fn is_hidden(&self) -> bool {
        self.has_type(self.snapshot.layout.node_type_ids.hidden)
    }

    /// GC roots: the designated root and every synthetic root category.
    pub fn is_root(&self) -> bool {
        self.index.0 == 0 || self.is_synthetic()
    }

    pub fn is_string(&self) -> bool {
        let ids = &self.snapshot.layout.node_type_ids;
        self.has_type(ids.string)
            || self.has_type(ids.concatenated_string)
            || self.has_type(ids.sliced_string)
    }

    pub fn attributes(&self) -> NodeAttributes {
        NodeAttributes::from_bits(self.snapshot.attribute_bits(self.index.index()))
    }

    /// Retained size; requires the dominator pass.
    pub fn retained_size(&self) -> Result<f64, SnapshotError> {
        if !self.snapshot.dominators_computed {
            return Err(SnapshotError::NotComputed {
                what: "retained size",
            });
        }
        Ok(self.snapshot.retained_sizes[self.index.index()])
    }

    /// Immediate dominator; `None` for the root. Requires the dominator pass.
    pub fn dominator_node(&self) -> Result<Option<HeapNode<'a>>, SnapshotError> {
        if !self.snapshot.dominators_computed {
            return Err(SnapshotError::NotComputed { what: "dominator" });
        }
        let dominator = self.snapshot.dominators[self.index.index()];
        if dominator == NO_ENTRY || dominator == self.index.0 {
            return Ok(None);
        }
        Ok(Some(HeapNode::new(self.snapshot, NodeIndex(dominator))))
    }

    pub fn has_path_edge(&self) -> bool {
        self.snapshot.path_edges[self.index.index()] != NO_ENTRY
    }

    /// The preferred parent edge toward a GC root, if annotated.
    pub fn path_edge(&self) -> Option<HeapEdge<'a>> {
        let edge = self.snapshot.path_edges[self.index.index()];
        (edge != NO_ENTRY).then(|| HeapEdge::new(self.snapshot, EdgeIndex(edge)))
    }

    pub fn location(&self) -> Option<NodeLocation> {
        self.snapshot.location_of(self.index.index())
    }

    /// Outgoing edges in snapshot order.
    pub fn references(&self) -> impl Iterator<Item = HeapEdge<'a>> + 'a {
        let snapshot = self.snapshot;
        snapshot
            .edge_range(self.index.index())
            .map(move |e| HeapEdge::new(snapshot, EdgeIndex(e as u32)))
    }

    /// Incoming edges.
    pub fn referrers(&self) -> impl Iterator<Item = HeapEdge<'a>> + 'a {
        let snapshot = self.snapshot;
        snapshot
            .retainer_range(self.index.index())
            .map(move |slot| HeapEdge::new(snapshot, EdgeIndex(snapshot.retaining_edges[slot])))
    }

    /// Visits outgoing edges until `f` breaks.
    pub fn for_each_reference<B>(
        &self,
        mut f: impl FnMut(HeapEdge<'a>) -> ControlFlow<B>,
    ) -> Option<B> {
        for edge in self.references() {
            if let ControlFlow::Break(b) = f(edge) {
                return Some(b);
            }
        }
        None
    }

    /// Visits incoming edges until `f` breaks.
    pub fn for_each_referrer<B>(
        &self,
        mut f: impl FnMut(HeapEdge<'a>) -> ControlFlow<B>,
    ) -> Option<B> {
        for edge in self.referrers() {
            if let ControlFlow::Break(b) = f(edge) {
                return Some(b);
            }
        }
        None
    }

    pub fn find_any_reference(
        &self,
        mut pred: impl FnMut(&HeapEdge<'a>) -> bool,
    ) -> Option<HeapEdge<'a>> {
        self.references().find(|e| pred(e))
    }

    pub fn find_any_referrer(
        &self,
        mut pred: impl FnMut(&HeapEdge<'a>) -> bool,
    ) -> Option<HeapEdge<'a>> {
        self.referrers().find(|e| pred(e))
    }

    pub fn find_referrers(&self, mut pred: impl FnMut(&HeapEdge<'a>) -> bool) -> Vec<HeapEdge<'a>> {
        self.referrers().filter(|e| pred(e)).collect()
    }

    /// Target of the first outgoing edge named `name` (optionally of a type).
    pub fn reference_node(&self, name: &str, edge_type: Option<&str>) -> Option<HeapNode<'a>> {
        self.find_any_reference(|e| {
            e.name_or_index().matches(name) && edge_type.map_or(true, |t| e.type_name() == t)
        })
        .map(|e| e.to_node())
    }

    /// Source of the first incoming edge named `name` (optionally of a type).
    pub fn referrer_node(&self, name: &str, edge_type: Option<&str>) -> Option<HeapNode<'a>> {
        self.find_any_referrer(|e| {
            e.name_or_index().matches(name) && edge_type.map_or(true, |t| e.type_name() == t)
        })
        .map(|e| e.from_node())
    }

    /// Reassembles the value of a string node.
    ///
    /// Concatenated strings are joined from their `first` and `second`
    /// parts; sliced strings resolve through `parent`. Returns `None` for
    /// non-string nodes.
    pub fn string_value(&self) -> Option<String> {
        if !self.is_string() {
            return None;
        }
        let ids = &self.snapshot.layout.node_type_ids;
        let mut out = String::new();
        let mut stack = vec![*self];
        let mut budget = self.snapshot.node_count();
        while let Some(node) = stack.pop() {
            if budget == 0 {
                break;
            }
            budget -= 1;
            if node.has_type(ids.concatenated_string) {
                let first = node.reference_node("first", None);
                let second = node.reference_node("second", None);
                if first.is_none() && second.is_none() {
                    out.push_str(node.raw_name());
                }
                // Push second first so first is emitted first.
                stack.extend(second);
                stack.extend(first);
            } else if node.has_type(ids.sliced_string) {
                match node.reference_node("parent", None) {
                    Some(parent) => stack.push(parent),
                    None => out.push_str(node.raw_name()),
                }
            } else {
                out.push_str(node.raw_name());
            }
        }
        Some(out)
    }
}

impl fmt::Debug for HeapNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapNode")
            .field("index", &self.index.0)
            .field("id", &self.id())
            .field("type", &self.type_name())
            .field("name", &self.name())
            .field("self_size", &self.self_size())
            .finish()
    }
}

impl PartialEq for HeapNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.snapshot, other.snapshot) && self.index == other.index
    }
}

impl Eq for HeapNode<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SnapshotBuilder;

    #[test]
    fn detached_name_gets_prefix() {
        let mut b = SnapshotBuilder::new();
        b.node("synthetic", "", 0);
        let div = b.node("native", "HTMLDivElement", 64);
        b.detachedness(div, Detachedness::Detached);
        let span = b.node("native", "Detached HTMLSpanElement", 64);
        b.detachedness(span, Detachedness::Detached);
        let snapshot = b.build().unwrap();

        let div = snapshot.node_by_id(div.id).unwrap();
        assert_eq!(div.name(), "Detached HTMLDivElement");
        assert_eq!(div.raw_name(), "HTMLDivElement");
        assert!(div.is_detached());
        // Already-prefixed names are not prefixed twice.
        let span = snapshot.node_by_id(span.id).unwrap();
        assert_eq!(span.name(), "Detached HTMLSpanElement");
    }

    #[test]
    fn retained_size_before_dominators_is_an_error() {
        let mut b = SnapshotBuilder::new();
        b.node("synthetic", "", 0);
        let snapshot = b.build().unwrap();
        let root = snapshot.node(snapshot.root_index()).unwrap();
        assert!(matches!(
            root.retained_size(),
            Err(SnapshotError::NotComputed { .. })
        ));
        assert!(root.dominator_node().is_err());
        assert!(root.path_edge().is_none());
    }

    #[test]
    fn early_stop_iteration() {
        let mut b = SnapshotBuilder::new();
        let root = b.node("synthetic", "", 0);
        for i in 0..5 {
            let child = b.node("object", &format!("C{i}"), 1);
            b.edge(root, child, "property", &format!("c{i}"));
        }
        let snapshot = b.build().unwrap();
        let root = snapshot.node(snapshot.root_index()).unwrap();

        let mut visited = 0;
        let found = root.for_each_reference(|edge| {
            visited += 1;
            if edge.to_node().raw_name() == "C2" {
                ControlFlow::Break(edge.to_node().id())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(visited, 3);
        assert!(found.is_some());

        let none: Option<()> = root.for_each_reference(|_| ControlFlow::Continue(()));
        assert!(none.is_none());
    }

    #[test]
    fn reference_and_referrer_lookup() {
        let mut b = SnapshotBuilder::new();
        let root = b.node("synthetic", "", 0);
        let a = b.node("object", "A", 1);
        let c = b.node("object", "C", 1);
        b.edge(root, a, "property", "a");
        b.edge(a, c, "property", "child");
        b.edge(a, c, "element", "3");
        let snapshot = b.build().unwrap();
        let a = snapshot.node_by_id(a.id).unwrap();
        let c = snapshot.node_by_id(c.id).unwrap();

        assert_eq!(a.reference_node("child", None), Some(c));
        assert_eq!(a.reference_node("3", Some("element")), Some(c));
        assert!(a.reference_node("child", Some("weak")).is_none());
        assert_eq!(c.referrer_node("child", Some("property")), Some(a));
        assert_eq!(c.find_referrers(|e| e.is_indexed()).len(), 1);

        let mut seen = 0;
        let indexed = c.for_each_referrer(|e| {
            seen += 1;
            if e.is_indexed() {
                ControlFlow::Break(e.from_node().id())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(indexed, Some(a.id()));
        assert_eq!(seen, 2);
    }

    #[test]
    fn string_values() {
        let mut b = SnapshotBuilder::new();
        let root = b.node("synthetic", "", 0);
        let left = b.node("string", "hello ", 16);
        let right = b.node("string", "world", 16);
        let cons = b.node("concatenated string", "hello world", 32);
        let sliced = b.node("sliced string", "world", 32);
        b.edge(root, cons, "property", "s");
        b.edge(cons, left, "internal", "first");
        b.edge(cons, right, "internal", "second");
        b.edge(sliced, cons, "internal", "parent");
        let obj = b.node("object", "Object", 16);
        let snapshot = b.build().unwrap();

        let cons = snapshot.node_by_id(cons.id).unwrap();
        assert_eq!(cons.string_value().as_deref(), Some("hello world"));
        let sliced = snapshot.node_by_id(sliced.id).unwrap();
        assert_eq!(sliced.string_value().as_deref(), Some("hello world"));
        assert!(snapshot.node_by_id(obj.id).unwrap().string_value().is_none());
    }

    #[test]
    fn attribute_bits() {
        let flags = NodeAttributes::LEAKED | NodeAttributes::DETACHED_DOM;
        assert!(flags.contains(NodeAttributes::LEAKED));
        assert!(!flags.contains(NodeAttributes::HIGHLIGHTED));
        assert!(NodeAttributes::NONE.is_empty());
    }
}
