//! Trace similarity strategies.
//!
//! [`TraceSimilarity`] is the seam between cluster bookkeeping and the
//! comparison logic. Two implementations ship:
//!
//! - [`HeuristicSimilarity`]: weighted lockstep alignment, clustered greedily
//!   against each cluster's first member.
//! - [`MlSimilarity`]: TF-IDF document vectors, cosine distance and
//!   nearest-neighbor-chain hierarchical clustering.

pub mod heuristic;
pub mod ml;

pub use heuristic::HeuristicSimilarity;
pub use ml::MlSimilarity;

use crate::config::{ClusterConfig, Strategy};
use crate::error::ClusterError;
use crate::trace::LeakTrace;

/// Decides which traces describe the same leak.
pub trait TraceSimilarity {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    /// Whether two traces belong in the same cluster.
    fn is_similar(&self, a: &LeakTrace, b: &LeakTrace) -> bool;

    /// Groups traces into clusters of input positions.
    ///
    /// Clusters are ordered by their first member and list members in input
    /// order. The default compares every trace against the first member of
    /// each existing cluster and opens a new cluster when none matches.
    fn cluster(&self, traces: &[LeakTrace]) -> Vec<Vec<usize>> {
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for (index, trace) in traces.iter().enumerate() {
            match clusters
                .iter_mut()
                .find(|members| self.is_similar(&traces[members[0]], trace))
            {
                Some(members) => members.push(index),
                None => clusters.push(vec![index]),
            }
        }
        clusters
    }
}

/// Builds the configured strategy after validating the configuration.
pub fn strategy_from_config(
    config: &ClusterConfig,
) -> Result<Box<dyn TraceSimilarity>, ClusterError> {
    config.validate()?;
    Ok(match config.strategy {
        Strategy::Heuristic => Box::new(HeuristicSimilarity::new(config.heuristic.clone())?),
        Strategy::Ml => Box::new(MlSimilarity::new(config.ml.clone())?),
    })
}
