//! Immediate dominators and retained sizes.
//!
//! Iterative Cooper-Harvey-Kennedy dominance adapted to heap graphs:
//!
//! 1. Weak edges and shortcut edges not leaving the root never retain.
//! 2. Nodes reachable from the root (skipping the root's edge to the DOM
//!    tree holder, shortcut and weak edges) are flagged page-owned. An edge
//!    from an unflagged node into a flagged node does not retain, unless it
//!    leaves the root.
//! 3. An explicit-stack DFS assigns post-order indices over retaining edges.
//!    Nodes held only by weak or shortcut edges seed a second pass; anything
//!    still unreached gets a trailing slot. The root is always last.
//! 4. Reverse post-order sweeps intersect retainer dominator chains until
//!    nothing changes.
//! 5. Retained sizes accumulate bottom-up along the dominator tree.

use petgraph::graph::DiGraph;
use tracing::debug;

use crate::config::TraversalConfig;
use crate::error::SnapshotError;
use crate::filter::{EdgeFilter, TraversalPolicy};
use crate::id::NodeIndex;
use crate::schema::is_type;
use crate::snapshot::{HeapSnapshot, NO_ENTRY};

/// Name of the synthetic holder of detached DOM trees under the root.
pub const DOCUMENT_DOM_TREES: &str = "(Document DOM trees)";

const ROOT: usize = 0;

/// Post-order numbering of the retaining subgraph.
struct PostOrder {
    node_to_post: Vec<u32>,
    post_to_node: Vec<u32>,
    /// Post indices below this were reached by the DFS.
    reached: usize,
}

struct Retention<'s, 'c> {
    snapshot: &'s HeapSnapshot,
    policy: TraversalPolicy<'c>,
    page_owned: Vec<bool>,
}

impl Retention<'_, '_> {
    /// Whether `edge` (leaving `source`) counts as a retaining reference.
    fn retains(&self, source: usize, edge: usize) -> bool {
        let s = self.snapshot;
        let ids = &s.layout.edge_type_ids;
        let edge_type = s.edge_type_value(edge);
        if is_type(edge_type, ids.weak) {
            return false;
        }
        if source != ROOT && is_type(edge_type, ids.shortcut) {
            return false;
        }
        if source != ROOT && !self.page_owned[source] && self.page_owned[s.edge_target(edge)] {
            return false;
        }
        self.policy.should_traverse(s, edge)
    }

    fn has_only_weak_retainers(&self, ordinal: usize) -> bool {
        let s = self.snapshot;
        let ids = &s.layout.edge_type_ids;
        s.retainer_range(ordinal).all(|slot| {
            let edge_type = s.edge_type_value(s.retaining_edges[slot] as usize);
            is_type(edge_type, ids.weak) || is_type(edge_type, ids.shortcut)
        })
    }
}

impl HeapSnapshot {
    /// Computes immediate dominators and retained sizes for every node.
    ///
    /// Unreachable nodes are attributed to the root so that every node ends
    /// up with both values.
    pub fn compute_dominators_and_retained_sizes(
        &mut self,
        config: &TraversalConfig,
        filter: &dyn EdgeFilter,
    ) {
        let node_count = self.node_count();
        if node_count == 0 {
            return;
        }
        debug!(node_count, "computing dominators");

        let (order, post_dominators) = {
            let retention = Retention {
                snapshot: self,
                policy: TraversalPolicy::new(config, filter),
                page_owned: self.page_owned_flags(),
            };
            let order = retention.post_order();
            let dominators = retention.fixed_point(&order);
            (order, dominators)
        };

        for post in 0..node_count {
            let node = order.post_to_node[post] as usize;
            let dominator = order.post_to_node[post_dominators[post] as usize];
            self.dominators[node] = dominator;
        }

        for ordinal in 0..node_count {
            let self_size = self.node_field(ordinal, self.layout.node.self_size_offset);
            self.retained_sizes[ordinal] = self_size as f64;
        }
        for post in 0..node_count - 1 {
            let node = order.post_to_node[post] as usize;
            let dominator = self.dominators[node] as usize;
            self.retained_sizes[dominator] += self.retained_sizes[node];
        }
        self.dominators_computed = true;
        debug!(
            reached = order.reached,
            unreached = node_count - 1 - order.reached,
            "dominators computed"
        );
    }

    /// Flags nodes owned by the page: reachable from the root without going
    /// through the DOM tree holder, shortcut or weak edges.
    fn page_owned_flags(&self) -> Vec<bool> {
        let ids = &self.layout.edge_type_ids;
        let mut flags = vec![false; self.node_count()];
        flags[ROOT] = true;
        let mut worklist = vec![ROOT];
        while let Some(node) = worklist.pop() {
            for edge in self.edge_range(node) {
                let edge_type = self.edge_type_value(edge);
                if is_type(edge_type, ids.weak) || is_type(edge_type, ids.shortcut) {
                    continue;
                }
                let target = self.edge_target(edge);
                if node == ROOT {
                    let name = self.string(self.node_field(target, self.layout.node.name_offset));
                    if name == DOCUMENT_DOM_TREES {
                        continue;
                    }
                }
                if !flags[target] {
                    flags[target] = true;
                    worklist.push(target);
                }
            }
        }
        flags
    }

    /// Exports the dominator tree as a petgraph graph.
    ///
    /// Graph node `i` is snapshot node `i`; each edge runs from a dominator
    /// to a node it immediately dominates.
    pub fn dominance_graph(&self) -> Result<DiGraph<NodeIndex, ()>, SnapshotError> {
        if !self.dominators_computed {
            return Err(SnapshotError::NotComputed {
                what: "dominator tree",
            });
        }
        let node_count = self.node_count();
        let mut graph = DiGraph::with_capacity(node_count, node_count.saturating_sub(1));
        for ordinal in 0..node_count {
            graph.add_node(NodeIndex(ordinal as u32));
        }
        for ordinal in 1..node_count {
            let dominator = self.dominators[ordinal];
            if dominator != NO_ENTRY && dominator as usize != ordinal {
                graph.add_edge(
                    NodeIndex(dominator).into(),
                    NodeIndex(ordinal as u32).into(),
                    (),
                );
            }
        }
        Ok(graph)
    }
}

impl Retention<'_, '_> {
    fn post_order(&self) -> PostOrder {
        let s = self.snapshot;
        let node_count = s.node_count();
        let mut node_to_post = vec![0u32; node_count];
        let mut post_to_node = vec![0u32; node_count];
        let mut visited = vec![false; node_count];
        let mut post = 0usize;

        // (node, next edge ordinal to inspect)
        let mut stack: Vec<(usize, usize)> = vec![(ROOT, s.edge_range(ROOT).start)];
        visited[ROOT] = true;

        for pass in 0..2 {
            while let Some(top) = stack.last_mut() {
                let (node, cursor) = *top;
                if cursor < s.edge_range(node).end {
                    top.1 += 1;
                    if !self.retains(node, cursor) {
                        continue;
                    }
                    let child = s.edge_target(cursor);
                    if visited[child] {
                        continue;
                    }
                    visited[child] = true;
                    stack.push((child, s.edge_range(child).start));
                } else {
                    stack.pop();
                    node_to_post[node] = post as u32;
                    post_to_node[post] = node as u32;
                    post += 1;
                }
            }

            if post == node_count || pass == 1 {
                break;
            }

            // Take the root back off the end and revisit it last, after the
            // subgraphs held only by weak references.
            post -= 1;
            stack.push((ROOT, s.edge_range(ROOT).end));
            for ordinal in 0..node_count {
                if visited[ordinal] || !self.has_only_weak_retainers(ordinal) {
                    continue;
                }
                visited[ordinal] = true;
                stack.push((ordinal, s.edge_range(ordinal).start));
            }
        }

        let mut reached = post.saturating_sub(1);
        if post != node_count {
            post -= 1;
            reached = post;
            for ordinal in 0..node_count {
                if visited[ordinal] {
                    continue;
                }
                node_to_post[ordinal] = post as u32;
                post_to_node[post] = ordinal as u32;
                post += 1;
            }
            node_to_post[ROOT] = post as u32;
            post_to_node[post] = ROOT as u32;
        }

        PostOrder {
            node_to_post,
            post_to_node,
            reached,
        }
    }

    /// Returns, per post index, the post index of the immediate dominator.
    ///
    /// Every reached node is revisited on each round, until a round changes
    /// nothing: a retainer's dominator chain can move up without that
    /// retainer's own idom changing.
    fn fixed_point(&self, order: &PostOrder) -> Vec<u32> {
        let s = self.snapshot;
        let node_count = s.node_count();
        let root_post = node_count - 1;
        let reached = order.reached;
        let no_entry = node_count as u32;

        let mut dominators = vec![no_entry; node_count];
        dominators[root_post] = root_post as u32;

        let mut rounds = 0usize;
        let mut changed = true;
        while changed {
            changed = false;
            rounds += 1;
            for post in (0..reached).rev() {
                // Being held by the root directly is final.
                if dominators[post] == root_post as u32 {
                    continue;
                }

                let node = order.post_to_node[post] as usize;
                let mut new_dominator = no_entry;
                let mut orphan = true;
                for slot in s.retainer_range(node) {
                    let edge = s.retaining_edges[slot] as usize;
                    let retainer = s.edge_from_node[edge] as usize;
                    if !self.retains(retainer, edge) {
                        continue;
                    }
                    orphan = false;
                    let mut finger = order.node_to_post[retainer];
                    if dominators[finger as usize] == no_entry {
                        continue;
                    }
                    if new_dominator == no_entry {
                        new_dominator = finger;
                    } else {
                        while finger != new_dominator {
                            while finger < new_dominator {
                                finger = dominators[finger as usize];
                            }
                            while new_dominator < finger {
                                new_dominator = dominators[new_dominator as usize];
                            }
                        }
                    }
                    if new_dominator == root_post as u32 {
                        break;
                    }
                }
                if orphan {
                    new_dominator = root_post as u32;
                }
                if new_dominator != no_entry && dominators[post] != new_dominator {
                    dominators[post] = new_dominator;
                    changed = true;
                }
            }
        }

        // Nodes the fixed point never settled hang off the root.
        for dominator in dominators.iter_mut() {
            if *dominator == no_entry {
                *dominator = root_post as u32;
            }
        }
        debug!(rounds, "dominator fixed point converged");
        dominators
    }
}
