//! Edge eligibility shared by the dominator engine and the path annotator.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::TraversalConfig;
use crate::edge::{EdgeName, HeapEdge};
use crate::id::EdgeIndex;
use crate::schema::is_type;
use crate::snapshot::HeapSnapshot;

/// Pluggable retainer-reference filter.
///
/// Returning `false` removes the edge from both dominance and path search.
/// Closures of the shape `|edge: &HeapEdge<'_>| -> bool` implement this.
pub trait EdgeFilter {
    fn should_traverse_edge(&self, edge: &HeapEdge<'_>) -> bool;
}

/// Filter that keeps every edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl EdgeFilter for AllowAll {
    fn should_traverse_edge(&self, _edge: &HeapEdge<'_>) -> bool {
        true
    }
}

impl<F> EdgeFilter for F
where
    F: Fn(&HeapEdge<'_>) -> bool,
{
    fn should_traverse_edge(&self, edge: &HeapEdge<'_>) -> bool {
        self(edge)
    }
}

static WEAK_MAP_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\d+)\) ->").expect("weak map key pattern"));

/// Whether the edge is a synthetic WeakMap entry edge.
///
/// V8 names these `part of key (K @id) -> value (V @id) pair in WeakMap (...)`.
pub fn is_weak_map_edge(edge: &HeapEdge<'_>) -> bool {
    matches!(edge.name_or_index(), EdgeName::Name(name) if name.contains("part of key"))
}

/// The key object id encoded in a WeakMap entry edge name.
pub fn weak_map_key_id(edge: &HeapEdge<'_>) -> Option<u64> {
    if !is_weak_map_edge(edge) {
        return None;
    }
    let name = edge.name_or_index().as_str()?;
    WEAK_MAP_KEY_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether the edge points at the WeakMap entry's own key, which the map
/// holds weakly.
pub fn is_weak_map_edge_to_key(edge: &HeapEdge<'_>) -> bool {
    weak_map_key_id(edge) == Some(edge.to_node().id())
}

/// A [`TraversalConfig`] resolved into lookup sets, plus the external filter.
pub(crate) struct TraversalPolicy<'c> {
    blocked_nodes: HashSet<&'c str>,
    blocked_edges: HashSet<&'c str>,
    less_preferable_edges: HashSet<&'c str>,
    less_preferable_nodes: HashSet<&'c str>,
    filter: &'c dyn EdgeFilter,
}

fn name_set(names: &[String]) -> HashSet<&str> {
    names.iter().map(String::as_str).collect()
}

impl<'c> TraversalPolicy<'c> {
    pub(crate) fn new(config: &'c TraversalConfig, filter: &'c dyn EdgeFilter) -> Self {
        TraversalPolicy {
            blocked_nodes: name_set(&config.node_name_block_list),
            blocked_edges: name_set(&config.edge_name_block_list),
            less_preferable_edges: name_set(&config.less_preferable_edge_names),
            less_preferable_nodes: name_set(&config.less_preferable_node_names),
            filter,
        }
    }

    /// Weak edges, blocked names and filtered edges are never traversed.
    pub(crate) fn should_traverse(&self, snapshot: &HeapSnapshot, edge: usize) -> bool {
        if is_type(snapshot.edge_type_value(edge), snapshot.layout.edge_type_ids.weak) {
            return false;
        }
        if let EdgeName::Name(name) = snapshot.edge_name(edge) {
            if self.blocked_edges.contains(name) {
                return false;
            }
        }
        if !self.blocked_nodes.is_empty() {
            let target = snapshot.edge_target(edge);
            let name = snapshot.string(snapshot.node_field(target, snapshot.layout.node.name_offset));
            if self.blocked_nodes.contains(name) {
                return false;
            }
        }
        let view = HeapEdge::new(snapshot, EdgeIndex(edge as u32));
        self.filter.should_traverse_edge(&view)
    }

    pub(crate) fn is_less_preferable(&self, snapshot: &HeapSnapshot, edge: usize) -> bool {
        if let EdgeName::Name(name) = snapshot.edge_name(edge) {
            if self.less_preferable_edges.contains(name) {
                return true;
            }
        }
        let target = snapshot.edge_target(edge);
        let name = snapshot.string(snapshot.node_field(target, snapshot.layout.node.name_offset));
        self.less_preferable_nodes.contains(name)
    }
}
