//! Batch clustering of leak traces and diffing against known clusters.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use heapgraph_core::{HeapSnapshot, NodeIndex};

use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::similarity::{strategy_from_config, TraceSimilarity};
use crate::trace::{path_to_trace, LeakTrace, LeakTracePath};

/// A group of traces judged to describe one leak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceCluster {
    /// The cluster's first member.
    pub representative: LeakTrace,
    /// Distinct traces in the cluster, representative first.
    pub traces: Vec<LeakTrace>,
    pub leaked_node_ids: BTreeSet<u64>,
    /// Sum of the retained sizes of the distinct leaked nodes.
    pub retained_size: f64,
    /// Number of input traces, duplicates included.
    pub count: usize,
}

impl TraceCluster {
    /// Clusters from one batch have disjoint leaked nodes, so sizes add up.
    fn absorb(&mut self, other: TraceCluster) {
        self.traces.extend(other.traces);
        self.leaked_node_ids.extend(other.leaked_node_ids);
        self.retained_size += other.retained_size;
        self.count += other.count;
    }
}

/// A trace together with the object it leads to.
///
/// The leaked node is tracked separately because a trace cut at the first
/// detached node no longer ends at the leaked object.
#[derive(Debug, Clone)]
struct LeakEntry {
    trace: LeakTrace,
    leaked_id: u64,
    retained_size: f64,
}

/// Clusters traces, taking the leaked node from each trace's last node.
pub fn cluster_traces(
    traces: &[LeakTrace],
    config: &ClusterConfig,
) -> Result<Vec<TraceCluster>, ClusterError> {
    let strategy = strategy_from_config(config)?;
    let mut entries = Vec::with_capacity(traces.len());
    for trace in traces {
        trace.validate()?;
        let Some(last) = trace.last_node() else {
            continue;
        };
        entries.push(LeakEntry {
            leaked_id: last.id,
            retained_size: last.retained_size.unwrap_or(last.self_size as f64),
            trace: trace.clone(),
        });
    }
    Ok(cluster_entries(entries, strategy.as_ref()))
}

/// Extracts the GC-root path of every leaked node and clusters the traces.
///
/// Nodes without a path are skipped. Run [`HeapSnapshot::prepare`] first so
/// that paths and retained sizes are available.
pub fn cluster_paths(
    snapshot: &HeapSnapshot,
    leaked: &[NodeIndex],
    config: &ClusterConfig,
) -> Result<Vec<TraceCluster>, ClusterError> {
    let strategy = strategy_from_config(config)?;
    let mut entries = Vec::with_capacity(leaked.len());
    let mut without_path = 0usize;
    for &index in leaked {
        let Some(path) = snapshot
            .path_to_gc_roots(index)
            .and_then(|path| LeakTracePath::from_heap_path(snapshot, &path))
        else {
            without_path += 1;
            continue;
        };
        let node = path.leaked_node();
        entries.push(LeakEntry {
            leaked_id: node.id,
            retained_size: node.retained_size.unwrap_or(node.self_size as f64),
            trace: path_to_trace(&path, config.truncate_at_detached),
        });
    }
    if without_path > 0 {
        debug!(without_path, "skipped leaked nodes with no path to a GC root");
    }
    Ok(cluster_entries(entries, strategy.as_ref()))
}

fn cluster_entries(entries: Vec<LeakEntry>, strategy: &dyn TraceSimilarity) -> Vec<TraceCluster> {
    // Identical traces are clustered once.
    let mut unique: IndexMap<blake3::Hash, Vec<LeakEntry>> = IndexMap::new();
    for entry in entries {
        unique.entry(entry.trace.fingerprint()).or_default().push(entry);
    }
    let distinct: Vec<LeakTrace> = unique
        .values()
        .map(|group| group[0].trace.clone())
        .collect();
    let groups: Vec<Vec<LeakEntry>> = unique.into_values().collect();

    let mut clusters: Vec<TraceCluster> = strategy
        .cluster(&distinct)
        .into_iter()
        .map(|members| {
            let mut sizes: BTreeMap<u64, f64> = BTreeMap::new();
            let mut count = 0;
            for &member in &members {
                for entry in &groups[member] {
                    sizes.entry(entry.leaked_id).or_insert(entry.retained_size);
                    count += 1;
                }
            }
            TraceCluster {
                representative: distinct[members[0]].clone(),
                traces: members.iter().map(|&m| distinct[m].clone()).collect(),
                leaked_node_ids: sizes.keys().copied().collect(),
                retained_size: sizes.values().sum(),
                count,
            }
        })
        .collect();
    clusters.sort_by(|a, b| b.retained_size.total_cmp(&a.retained_size));

    info!(
        strategy = strategy.name(),
        traces = groups.iter().map(Vec::len).sum::<usize>(),
        distinct = distinct.len(),
        clusters = clusters.len(),
        "clustered leak traces"
    );
    clusters
}

/// Outcome of comparing fresh clusters with previously recorded ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterDiff {
    /// One representative per merged group; recorded ones win.
    pub all_clusters: Vec<LeakTrace>,
    /// Recorded representatives now covered by an earlier recorded one.
    pub stale_representatives: Vec<LeakTrace>,
    /// Fresh clusters that match nothing recorded.
    pub clusters_to_add: Vec<TraceCluster>,
}

/// Clusters recorded representatives together with fresh ones.
///
/// Within each group the first recorded representative survives and any
/// other recorded representative becomes stale. Groups made only of fresh
/// clusters are merged into one cluster to add.
pub fn diff_clusters(
    fresh: &[TraceCluster],
    recorded: &[LeakTrace],
    config: &ClusterConfig,
) -> Result<ClusterDiff, ClusterError> {
    let strategy = strategy_from_config(config)?;
    for trace in recorded {
        trace.validate()?;
    }
    let combined: Vec<LeakTrace> = recorded
        .iter()
        .cloned()
        .chain(fresh.iter().map(|c| c.representative.clone()))
        .collect();

    let mut diff = ClusterDiff::default();
    for group in strategy.cluster(&combined) {
        let (old, new): (Vec<usize>, Vec<usize>) =
            group.into_iter().partition(|&i| i < recorded.len());
        if let Some((&keep, stale)) = old.split_first() {
            diff.all_clusters.push(recorded[keep].clone());
            diff.stale_representatives
                .extend(stale.iter().map(|&i| recorded[i].clone()));
            continue;
        }
        let mut added = new.iter().map(|&i| fresh[i - recorded.len()].clone());
        let Some(mut cluster) = added.next() else {
            continue;
        };
        for other in added {
            cluster.absorb(other);
        }
        diff.all_clusters.push(cluster.representative.clone());
        diff.clusters_to_add.push(cluster);
    }
    info!(
        recorded = recorded.len(),
        fresh = fresh.len(),
        stale = diff.stale_representatives.len(),
        new = diff.clusters_to_add.len(),
        "diffed clusters"
    );
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Strategy;
    use crate::similarity::fixtures::trace;
    use crate::trace::TraceElement;

    fn with_leaked(mut t: LeakTrace, id: u64, size: f64) -> LeakTrace {
        if let Some(TraceElement::Node(node)) = t.elements.last_mut() {
            node.id = id;
            node.retained_size = Some(size);
        }
        t
    }

    fn store_trace(index: &str) -> LeakTrace {
        trace(&[("store", "Store"), ("items", "Array"), (index, "Item")])
    }

    fn router_trace() -> LeakTrace {
        trace(&[("router", "Router"), ("routes", "Set"), ("home", "Route")])
    }

    #[test]
    fn duplicates_are_counted_once_per_leaked_node() {
        let traces = vec![
            with_leaked(store_trace("0"), 100, 64.0),
            with_leaked(store_trace("0"), 100, 64.0),
            with_leaked(store_trace("1"), 101, 32.0),
            with_leaked(router_trace(), 200, 500.0),
        ];
        let clusters = cluster_traces(&traces, &ClusterConfig::default()).unwrap();
        assert_eq!(clusters.len(), 2);

        // Sorted by retained size, largest first.
        assert_eq!(clusters[0].leaked_node_ids, BTreeSet::from([200]));
        assert_eq!(clusters[0].retained_size, 500.0);

        let store = &clusters[1];
        assert_eq!(store.count, 3);
        assert_eq!(store.traces.len(), 2);
        assert_eq!(store.leaked_node_ids, BTreeSet::from([100, 101]));
        assert_eq!(store.retained_size, 96.0);
        assert_eq!(store.representative, store.traces[0]);
    }

    #[test]
    fn identical_traces_are_clustered_once() {
        let traces: Vec<_> = (0..100)
            .map(|i| with_leaked(store_trace("5"), 1000 + i, 8.0))
            .collect();
        for strategy in [Strategy::Heuristic, Strategy::Ml] {
            let mut config = ClusterConfig {
                strategy,
                ..ClusterConfig::default()
            };
            config.ml.max_distance_threshold = 0.9;
            let clusters = cluster_traces(&traces, &config).unwrap();
            assert_eq!(clusters.len(), 1);
            assert_eq!(clusters[0].count, 100);
            assert_eq!(clusters[0].leaked_node_ids.len(), 100);
            assert_eq!(clusters[0].retained_size, 800.0);
        }
    }

    #[test]
    fn near_duplicates_share_a_cluster_under_both_strategies() {
        let view = trace(&[("store", "Store"), ("items", "Array"), ("7", "ItemView")]);
        let traces = vec![
            with_leaked(store_trace("0"), 1, 10.0),
            with_leaked(store_trace("0"), 1, 10.0),
            with_leaked(store_trace("1"), 2, 10.0),
            with_leaked(store_trace("2"), 3, 10.0),
            with_leaked(view, 4, 10.0),
            with_leaked(router_trace(), 5, 5.0),
        ];
        for strategy in [Strategy::Heuristic, Strategy::Ml] {
            let config = ClusterConfig {
                strategy,
                ..ClusterConfig::default()
            };
            let clusters = cluster_traces(&traces, &config).unwrap();
            assert_eq!(clusters.len(), 2, "{strategy:?}");

            let store = &clusters[0];
            assert_eq!(store.traces.len(), 4, "{strategy:?}");
            assert_eq!(store.count, 5);
            assert_eq!(store.leaked_node_ids, BTreeSet::from([1, 2, 3, 4]));
            assert_eq!(store.retained_size, 40.0);
            assert_eq!(clusters[1].leaked_node_ids, BTreeSet::from([5]));
        }
    }

    #[test]
    fn malformed_trace_is_rejected() {
        let mut bad = store_trace("0");
        bad.elements.pop();
        assert!(cluster_traces(&[bad], &ClusterConfig::default()).is_err());
    }

    #[test]
    fn diff_keeps_recorded_and_flags_stale() {
        let config = ClusterConfig::default();
        let fresh = cluster_traces(
            &[
                with_leaked(store_trace("3"), 1, 10.0),
                with_leaked(router_trace(), 2, 20.0),
            ],
            &config,
        )
        .unwrap();
        let recorded = vec![store_trace("0"), store_trace("9")];

        let diff = diff_clusters(&fresh, &recorded, &config).unwrap();
        assert_eq!(diff.stale_representatives, vec![store_trace("9")]);
        assert_eq!(diff.clusters_to_add.len(), 1);
        assert_eq!(diff.clusters_to_add[0].leaked_node_ids, BTreeSet::from([2]));
        assert_eq!(diff.all_clusters.len(), 2);
        assert_eq!(diff.all_clusters[0], store_trace("0"));
    }

    #[test]
    fn diff_without_recorded_adds_everything() {
        let config = ClusterConfig::default();
        let fresh = cluster_traces(&[store_trace("0"), router_trace()], &config).unwrap();
        let diff = diff_clusters(&fresh, &[], &config).unwrap();
        assert!(diff.stale_representatives.is_empty());
        assert_eq!(diff.clusters_to_add, fresh);
    }
}
