//! TF-IDF vectors, cosine distance and hierarchical clustering.

mod distance;
mod hac;
mod tfidf;

use tracing::debug;

use crate::config::MlConfig;
use crate::error::ClusterError;
use crate::similarity::TraceSimilarity;
use crate::trace::LeakTrace;

pub struct MlSimilarity {
    config: MlConfig,
}

impl MlSimilarity {
    pub fn new(config: MlConfig) -> Result<Self, ClusterError> {
        config.validate()?;
        Ok(MlSimilarity { config })
    }

    fn cluster_refs(&self, traces: &[&LeakTrace]) -> Vec<Vec<usize>> {
        let n = traces.len();
        if n <= 1 {
            return (0..n).map(|i| vec![i]).collect();
        }
        let documents: Vec<Vec<String>> = traces.iter().map(|t| tfidf::tokenize(t)).collect();
        let rows = tfidf::fit_transform(&documents, &self.config);
        let distances = distance::pairwise_distances(&rows);
        let merges = hac::nn_chain(distances, n, self.config.linkage);
        let clusters = hac::flat_clusters(n, &merges, self.config.max_distance_threshold);
        debug!(
            traces = n,
            clusters = clusters.len(),
            linkage = ?self.config.linkage,
            "hierarchical clustering done"
        );
        clusters
    }
}

impl TraceSimilarity for MlSimilarity {
    fn name(&self) -> &'static str {
        "ml"
    }

    /// Clusters the pair on its own; the vocabulary is fitted to just these
    /// two traces.
    fn is_similar(&self, a: &LeakTrace, b: &LeakTrace) -> bool {
        self.cluster_refs(&[a, b]).len() == 1
    }

    fn cluster(&self, traces: &[LeakTrace]) -> Vec<Vec<usize>> {
        let refs: Vec<&LeakTrace> = traces.iter().collect();
        self.cluster_refs(&refs)
    }
}
