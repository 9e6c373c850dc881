//! Reproducible down-sampling of leak candidates.

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use heapgraph_core::NodeIndex;

/// Picks at most `max` nodes, keeping their input order.
///
/// The choice depends only on `seed`, so repeated runs over the same
/// snapshot cluster the same candidates.
pub fn sample_nodes(nodes: &[NodeIndex], max: usize, seed: u64) -> Vec<NodeIndex> {
    if nodes.len() <= max {
        return nodes.to_vec();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = index::sample(&mut rng, nodes.len(), max).into_vec();
    picked.sort_unstable();
    tracing::debug!(from = nodes.len(), kept = max, "sampled leak candidates");
    picked.into_iter().map(|i| nodes[i]).collect()
}
