//! Error types for heapgraph-cluster.

use thiserror::Error;

/// Errors produced while converting, persisting or clustering leak traces.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A trace does not alternate node/edge records or does not end in a node.
    #[error("malformed trace: {reason}")]
    MalformedTrace { reason: String },

    /// A configuration value is out of its valid range.
    #[error("invalid {name}: {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    /// A synonym pattern failed to compile.
    #[error("invalid synonym pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Trace JSON could not be encoded or decoded.
    #[error("trace serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
