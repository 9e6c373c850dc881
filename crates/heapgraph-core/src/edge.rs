//! Edge views over the snapshot's flat edge records.
//!
//! The source node of an edge is not stored per edge in the snapshot; it is
//! resolved through the `edge -> source` array built alongside the retainer
//! index.

use std::fmt;

use crate::id::{EdgeIndex, NodeIndex};
use crate::node::HeapNode;
use crate::schema::is_type;
use crate::snapshot::HeapSnapshot;

/// An edge's label: a numeric index for `element`/`hidden` edges, otherwise
/// a string-table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeName<'a> {
    Index(u64),
    Name(&'a str),
}

impl<'a> EdgeName<'a> {
    /// The string name, if this is not an indexed edge.
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            EdgeName::Name(name) => Some(name),
            EdgeName::Index(_) => None,
        }
    }

    /// Compares against a textual label (`"3"` matches `Index(3)`).
    pub fn matches(&self, label: &str) -> bool {
        match self {
            EdgeName::Name(name) => *name == label,
            EdgeName::Index(i) => label.parse::<u64>().map_or(false, |l| l == *i),
        }
    }
}

impl fmt::Display for EdgeName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeName::Index(i) => write!(f, "{}", i),
            EdgeName::Name(name) => f.write_str(name),
        }
    }
}

/// A view of one edge record.
#[derive(Clone, Copy)]
pub struct HeapEdge<'a> {
    snapshot: &'a HeapSnapshot,
    index: EdgeIndex,
}

impl<'a> HeapEdge<'a> {
    pub(crate) fn new(snapshot: &'a HeapSnapshot, index: EdgeIndex) -> Self {
        HeapEdge { snapshot, index }
    }

    pub fn index(&self) -> EdgeIndex {
        self.index
    }

    pub fn snapshot(&self) -> &'a HeapSnapshot {
        self.snapshot
    }

    pub fn type_name(&self) -> &'a str {
        let value = self.snapshot.edge_type_value(self.index.index());
        self.snapshot.layout.edge_types.name(value)
    }

    /// True for `element` and `hidden` edges, whose label is numeric.
    pub fn is_indexed(&self) -> bool {
        self.snapshot.edge_is_indexed(self.index.index())
    }

    pub fn name_or_index(&self) -> EdgeName<'a> {
        self.snapshot.edge_name(self.index.index())
    }

    fn has_type(&self, type_id: Option<u64>) -> bool {
        is_type(self.snapshot.edge_type_value(self.index.index()), type_id)
    }

    pub fn is_weak(&self) -> bool {
        self.has_type(self.snapshot.layout.edge_type_ids.weak)
    }

    pub fn is_shortcut(&self) -> bool {
        self.has_type(self.snapshot.layout.edge_type_ids.shortcut)
    }

    pub fn is_hidden(&self) -> bool {
        self.has_type(self.snapshot.layout.edge_type_ids.hidden)
    }

    pub fn is_property(&self) -> bool {
        self.has_type(self.snapshot.layout.edge_type_ids.property)
    }

    pub fn to_index(&self) -> NodeIndex {
        NodeIndex(self.snapshot.edge_target(self.index.index()) as u32)
    }

    pub fn to_node(&self) -> HeapNode<'a> {
        HeapNode::new(self.snapshot, self.to_index())
    }

    pub fn from_index(&self) -> NodeIndex {
        NodeIndex(self.snapshot.edge_from_node[self.index.index()])
    }

    pub fn from_node(&self) -> HeapNode<'a> {
        HeapNode::new(self.snapshot, self.from_index())
    }
}

impl fmt::Debug for HeapEdge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapEdge")
            .field("index", &self.index.0)
            .field("type", &self.type_name())
            .field("name_or_index", &self.name_or_index())
            .field("from", &self.from_index().0)
            .field("to", &self.to_index().0)
            .finish()
    }
}

impl PartialEq for HeapEdge<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.snapshot, other.snapshot) && self.index == other.index
    }
}

impl Eq for HeapEdge<'_> {}
