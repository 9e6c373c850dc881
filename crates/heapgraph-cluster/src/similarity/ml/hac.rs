//! Hierarchical agglomerative clustering with the nearest-neighbor chain.
//!
//! Runs in O(n²) time over a condensed distance matrix that is updated in
//! place; the chain itself needs O(n) extra memory. Valid for reducible
//! linkages, which covers single and average.

use indexmap::IndexMap;
use petgraph::unionfind::UnionFind;

use super::distance::condensed_index;
use crate::config::Linkage;

/// One agglomeration step. After it, slot `y` holds the merged cluster and
/// slot `x` is retired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Merge {
    pub x: usize,
    pub y: usize,
    pub distance: f64,
}

/// Produces the `n - 1` merges of the full dendrogram, in discovery order.
pub(crate) fn nn_chain(mut distances: Vec<f64>, n: usize, linkage: Linkage) -> Vec<Merge> {
    let mut size = vec![1usize; n];
    let mut chain: Vec<usize> = Vec::with_capacity(n);
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    for _ in 1..n {
        if chain.is_empty() {
            match size.iter().position(|&s| s > 0) {
                Some(first) => chain.push(first),
                None => break,
            }
        }

        let (x, y, current_min) = loop {
            let x = chain[chain.len() - 1];
            let previous = chain.len().checked_sub(2).map(|k| chain[k]);
            // Prefer the previous chain element on ties to avoid cycles.
            let (mut y, mut current_min) = match previous {
                Some(p) => (p, distances[condensed_index(n, x, p)]),
                None => (x, f64::INFINITY),
            };
            for i in 0..n {
                if size[i] == 0 || i == x {
                    continue;
                }
                let d = distances[condensed_index(n, x, i)];
                if d < current_min || y == x {
                    current_min = d;
                    y = i;
                }
            }
            if previous == Some(y) {
                break (x, y, current_min);
            }
            chain.push(y);
        };

        chain.truncate(chain.len() - 2);
        let (x, y) = if x > y { (y, x) } else { (x, y) };
        let (nx, ny) = (size[x], size[y]);
        merges.push(Merge {
            x,
            y,
            distance: current_min,
        });
        size[x] = 0;
        size[y] = nx + ny;

        for i in 0..n {
            if size[i] == 0 || i == y {
                continue;
            }
            let d_xi = distances[condensed_index(n, i, x)];
            let d_yi = distances[condensed_index(n, i, y)];
            distances[condensed_index(n, i, y)] = match linkage {
                Linkage::Single => d_xi.min(d_yi),
                Linkage::Average => (nx as f64 * d_xi + ny as f64 * d_yi) / (nx + ny) as f64,
            };
        }
    }
    merges
}

/// Cuts the dendrogram: points joined by merges at or below `threshold`
/// share a cluster. Clusters are ordered by their first member.
pub(crate) fn flat_clusters(n: usize, merges: &[Merge], threshold: f64) -> Vec<Vec<usize>> {
    let mut sets = UnionFind::<usize>::new(n);
    for merge in merges.iter().filter(|m| m.distance <= threshold) {
        sets.union(merge.x, merge.y);
    }
    let mut groups: IndexMap<usize, Vec<usize>> = IndexMap::new();
    for (point, label) in sets.into_labeling().into_iter().enumerate() {
        groups.entry(label).or_default().push(point);
    }
    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // d(0,1) = 0.1, d(0,2) = 0.3, d(1,2) = 0.9
    const TRIANGLE: [f64; 3] = [0.1, 0.3, 0.9];

    #[test]
    fn single_linkage_chains_through_nearest_member() {
        let merges = nn_chain(TRIANGLE.to_vec(), 3, Linkage::Single);
        assert_eq!(
            merges,
            vec![
                Merge { x: 0, y: 1, distance: 0.1 },
                Merge { x: 1, y: 2, distance: 0.3 },
            ]
        );
        assert_eq!(flat_clusters(3, &merges, 0.5), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn average_linkage_uses_mean_distance() {
        let merges = nn_chain(TRIANGLE.to_vec(), 3, Linkage::Average);
        assert!((merges[1].distance - 0.6).abs() < 1e-12);
        assert_eq!(flat_clusters(3, &merges, 0.5), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn two_tight_groups() {
        // Points 0 and 2 are close, 1 and 3 are close, the groups are far apart.
        let n = 4;
        let mut distances = vec![0.0; n * (n - 1) / 2];
        for i in 0..n {
            for j in i + 1..n {
                distances[condensed_index(n, i, j)] = if i % 2 == j % 2 { 0.05 } else { 0.95 };
            }
        }
        let merges = nn_chain(distances, n, Linkage::Single);
        assert_eq!(merges.len(), 3);
        assert_eq!(flat_clusters(n, &merges, 0.5), vec![vec![0, 2], vec![1, 3]]);
        assert_eq!(flat_clusters(n, &merges, 0.0), vec![vec![0], vec![1], vec![2], vec![3]]);
        assert_eq!(flat_clusters(n, &merges, 1.0).len(), 1);
    }

    #[test]
    fn trivial_inputs() {
        assert!(nn_chain(Vec::new(), 0, Linkage::Single).is_empty());
        assert!(nn_chain(Vec::new(), 1, Linkage::Single).is_empty());
        assert_eq!(flat_clusters(1, &[], 0.5), vec![vec![0]]);
        assert!(flat_clusters(0, &[], 0.5).is_empty());
    }
}
