//! Dense index newtypes for heap graph entities.
//!
//! A [`NodeIndex`] is the internal 0-based ordinal of a node record, distinct
//! from the node's externally meaningful `id`. An [`EdgeIndex`] is the ordinal
//! of an edge record. Both wrap `u32` so they can be stored in compact
//! scratch arrays.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dense node ordinal into the snapshot's node records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(pub u32);

/// Dense edge ordinal into the snapshot's edge records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeIndex(pub u32);

impl NodeIndex {
    /// Returns the ordinal as a `usize` for array indexing.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeIndex {
    /// Returns the ordinal as a `usize` for array indexing.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Bridge to petgraph indices, used when exporting the dominance subgraph.

impl From<NodeIndex> for petgraph::graph::NodeIndex<u32> {
    fn from(idx: NodeIndex) -> Self {
        petgraph::graph::NodeIndex::new(idx.index())
    }
}

impl From<petgraph::graph::NodeIndex<u32>> for NodeIndex {
    fn from(idx: petgraph::graph::NodeIndex<u32>) -> Self {
        NodeIndex(idx.index() as u32)
    }
}
