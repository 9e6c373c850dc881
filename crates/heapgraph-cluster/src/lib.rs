//! Leak-trace clustering for heap snapshots.
//!
//! Paths extracted by `heapgraph-core` are copied into [`LeakTrace`]s, then
//! grouped by a pluggable [`TraceSimilarity`] strategy into
//! [`TraceCluster`]s. [`diff_clusters`] compares a fresh batch with
//! representatives recorded by an earlier run.

pub mod cluster;
pub mod config;
pub mod error;
pub mod sample;
pub mod similarity;
pub mod trace;

pub use cluster::{cluster_paths, cluster_traces, diff_clusters, ClusterDiff, TraceCluster};
pub use config::{ClusterConfig, HeuristicConfig, Linkage, MlConfig, Strategy};
pub use error::ClusterError;
pub use sample::sample_nodes;
pub use similarity::{strategy_from_config, HeuristicSimilarity, MlSimilarity, TraceSimilarity};
pub use trace::{
    path_to_trace, trace_to_path, EdgeLabel, EdgeRecord, LeakTrace, LeakTracePath, NodeRecord,
    TraceElement,
};
