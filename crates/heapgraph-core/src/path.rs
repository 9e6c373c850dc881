//! Preferred shortest paths from GC roots, and path extraction.
//!
//! The annotator runs a level-by-level BFS from the GC roots and gives every
//! reachable node one parent edge, first come first served. Edges the
//! configuration marks less preferable are postponed and only followed when a
//! level produces no regular successors; low-priority roots are only searched
//! once both are exhausted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::TraversalConfig;
use crate::edge::HeapEdge;
use crate::error::SnapshotError;
use crate::filter::{is_weak_map_edge_to_key, EdgeFilter, TraversalPolicy};
use crate::id::{EdgeIndex, NodeIndex};
use crate::node::HeapNode;
use crate::snapshot::{HeapSnapshot, NO_ENTRY};

/// One step of a root-first path: a node and the edge leading to the next
/// step (`None` on the last step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub node: NodeIndex,
    pub edge: Option<EdgeIndex>,
}

/// A path from a GC root down to a node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeapPath {
    pub steps: Vec<PathStep>,
}

impl HeapPath {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The root the path starts at.
    pub fn root(&self) -> Option<NodeIndex> {
        self.steps.first().map(|s| s.node)
    }

    /// The node the path was extracted for.
    pub fn target(&self) -> Option<NodeIndex> {
        self.steps.last().map(|s| s.node)
    }

    /// Resolves the steps into node/edge views.
    pub fn views<'a>(
        &self,
        snapshot: &'a HeapSnapshot,
    ) -> Vec<(HeapNode<'a>, Option<HeapEdge<'a>>)> {
        self.steps
            .iter()
            .filter_map(|step| {
                let node = snapshot.node(step.node)?;
                let edge = step.edge.and_then(|e| snapshot.edge(e));
                Some((node, edge))
            })
            .collect()
    }
}

impl HeapSnapshot {
    /// Forgets every path edge so the annotator can run again.
    pub fn clear_shortest_path_info(&mut self) {
        self.path_edges.fill(NO_ENTRY);
    }

    /// Assigns each reachable node its preferred parent edge toward a root.
    ///
    /// Nodes whose ids are in `exclude` are never entered. Previous path
    /// edges are cleared first. Returns the number of nodes that received a
    /// path edge.
    pub fn annotate_shortest_paths(
        &mut self,
        config: &TraversalConfig,
        filter: &dyn EdgeFilter,
        exclude: Option<&HashSet<u64>>,
    ) -> Result<usize, SnapshotError> {
        let node_count = self.node_count();
        let mut excluded = vec![false; node_count];
        if let Some(ids) = exclude {
            for &id in ids {
                let index = self
                    .index_of_id(id)
                    .ok_or(SnapshotError::UnknownNodeId { id })?;
                excluded[index.index()] = true;
            }
        }

        self.clear_shortest_path_info();
        if node_count == 0 {
            return Ok(0);
        }

        let (roots, low_priority_roots) = self.partition_roots(config);
        debug!(
            roots = roots.len(),
            low_priority = low_priority_roots.len(),
            "annotating shortest paths"
        );

        let mut path_edges = std::mem::take(&mut self.path_edges);
        let assigned = {
            let mut search = PathSearch {
                snapshot: self,
                policy: TraversalPolicy::new(config, filter),
                excluded,
                visited: vec![false; node_count],
                queued: vec![false; node_count],
                path_edges: &mut path_edges,
                assigned: 0,
            };
            search.run(roots);
            search.run(low_priority_roots);
            search.assigned
        };
        self.path_edges = path_edges;

        info!(assigned, node_count, "shortest paths annotated");
        Ok(assigned)
    }

    /// Splits the GC roots into regular and low-priority roots, each in
    /// node order. The designated root always leads the regular roots.
    fn partition_roots(&self, config: &TraversalConfig) -> (Vec<usize>, Vec<usize>) {
        let mut roots = Vec::new();
        let mut low = Vec::new();
        for node in self.nodes() {
            if !node.is_root() {
                continue;
            }
            let ordinal = node.index().index();
            if ordinal != 0 && config.is_low_priority_root(node.raw_name()) {
                low.push(ordinal);
            } else {
                roots.push(ordinal);
            }
        }
        (roots, low)
    }

    /// Walks path edges up from `node` and returns the root-first path.
    ///
    /// `None` when the node has no path edge: it is unreachable under the
    /// current traversal rules, or it is itself a root.
    pub fn path_to_gc_roots(&self, node: NodeIndex) -> Option<HeapPath> {
        let mut current = node.index();
        if current >= self.node_count() || self.path_edges[current] == NO_ENTRY {
            return None;
        }

        let mut steps = vec![PathStep { node, edge: None }];
        // Every node holds at most one path edge, so a walk longer than the
        // node count can only mean a cycle.
        for _ in 0..self.node_count() {
            let edge = self.path_edges[current];
            if edge == NO_ENTRY {
                steps.reverse();
                return Some(HeapPath { steps });
            }
            let parent = self.edge_from_node[edge as usize] as usize;
            steps.push(PathStep {
                node: NodeIndex(parent as u32),
                edge: Some(EdgeIndex(edge)),
            });
            current = parent;
        }
        None
    }

    /// Runs detachedness, dominators and shortest paths once.
    ///
    /// Later calls on the same store are no-ops.
    pub fn prepare(
        &mut self,
        config: &TraversalConfig,
        filter: &dyn EdgeFilter,
    ) -> Result<(), SnapshotError> {
        if self.is_processed() {
            debug!("snapshot already processed");
            return Ok(());
        }
        self.propagate_detachedness();
        self.compute_dominators_and_retained_sizes(config, filter);
        self.annotate_shortest_paths(config, filter, None)?;
        self.set_processed(true);
        Ok(())
    }
}

struct PathSearch<'s, 'c, 'p> {
    snapshot: &'s HeapSnapshot,
    policy: TraversalPolicy<'c>,
    excluded: Vec<bool>,
    visited: Vec<bool>,
    queued: Vec<bool>,
    path_edges: &'p mut Vec<u32>,
    assigned: usize,
}

impl PathSearch<'_, '_, '_> {
    fn run(&mut self, roots: Vec<usize>) {
        let s = self.snapshot;
        let mut current: Vec<usize> = roots
            .into_iter()
            .filter(|&r| !self.excluded[r] && !self.visited[r] && !self.queued[r])
            .collect();
        for &root in &current {
            self.queued[root] = true;
        }
        let mut postponed: Vec<usize> = Vec::new();

        while !current.is_empty() {
            let mut next = Vec::new();
            for &node in &current {
                self.visited[node] = true;
                for edge in s.edge_range(node) {
                    let target = s.edge_target(edge);
                    if self.visited[target] || self.queued[target] || self.excluded[target] {
                        continue;
                    }
                    if HeapNode::new(s, NodeIndex(target as u32)).is_root() {
                        continue;
                    }
                    if !self.policy.should_traverse(s, edge) {
                        continue;
                    }
                    let view = HeapEdge::new(s, EdgeIndex(edge as u32));
                    if is_weak_map_edge_to_key(&view) {
                        continue;
                    }
                    if self.policy.is_less_preferable(s, edge) {
                        postponed.push(edge);
                        continue;
                    }
                    self.enqueue(edge, target, &mut next);
                }
            }

            if next.is_empty() {
                for edge in postponed.drain(..) {
                    let target = s.edge_target(edge);
                    if self.visited[target] || self.queued[target] {
                        continue;
                    }
                    self.enqueue(edge, target, &mut next);
                }
            }
            current = next;
        }
    }

    fn enqueue(&mut self, edge: usize, target: usize, next: &mut Vec<usize>) {
        self.path_edges[target] = edge as u32;
        self.queued[target] = true;
        self.assigned += 1;
        next.push(target);
    }
}
