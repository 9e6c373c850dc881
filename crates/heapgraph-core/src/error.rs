//! Error types for heapgraph-core.
//!
//! [`SnapshotError`] separates corrupt input (the snapshot itself is
//! malformed, construction fails fast) from precondition violations (an
//! analysis result was requested before the pass that produces it ran).
//! Expected "not found" outcomes are never errors; they surface as `Option`.

use thiserror::Error;

/// Errors produced while building or querying a heap snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The schema does not declare a field that a feature requires.
    #[error("missing {kind} field: '{field}'")]
    MissingField { kind: &'static str, field: String },

    /// An enumerated type name is absent from the schema's type table.
    #[error("missing {kind} type: '{name}'")]
    MissingType { kind: &'static str, name: String },

    /// A flat value array is not a whole number of records.
    #[error("{kind} array length {len} is not a multiple of record width {width}")]
    RecordLength {
        kind: &'static str,
        len: usize,
        width: usize,
    },

    /// An edge's target pointer is not aligned to the node record width or
    /// points past the node array.
    #[error("edge {edge} has misaligned target pointer {target}")]
    MisalignedEdgeTarget { edge: usize, target: u64 },

    /// A name field references a string-table slot that does not exist.
    #[error("string index {index} out of range (table has {len} entries)")]
    StringIndex { index: u64, len: usize },

    /// The per-node edge counts do not add up to the edge array.
    #[error("node edge counts declare {declared} edges but the edge array holds {actual}")]
    EdgeCountMismatch { declared: usize, actual: usize },

    /// A node id was supplied that does not belong to this snapshot.
    #[error("unknown node id: @{id}")]
    UnknownNodeId { id: u64 },

    /// A derived value was requested before the pass that computes it.
    #[error("{what} has not been computed for this snapshot")]
    NotComputed { what: &'static str },

    /// The snapshot JSON could not be decoded.
    #[error("snapshot decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading the snapshot failed.
    #[error("snapshot read error: {0}")]
    Io(#[from] std::io::Error),
}
