//! Detachedness propagation over native (embedder) objects.
//!
//! Only entry points into embedder code know whether they are still part of
//! the live document. This pass spreads that knowledge to the native objects
//! they own:
//!
//! 1. Every node with a known state is seeded into an attached or a detached
//!    work list.
//! 2. Attached state is propagated to completion first, then detached state,
//!    so attached always wins when both could reach a node.
//! 3. Propagation only enters `native` nodes (JavaScript objects stop it) and
//!    never follows hidden, invisible or weak edges.

use tracing::{debug, warn};

use crate::node::Detachedness;
use crate::schema::is_type;
use crate::snapshot::HeapSnapshot;

/// Outcome of [`HeapSnapshot::propagate_detachedness`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetachednessStats {
    pub attached: usize,
    pub detached: usize,
}

impl HeapSnapshot {
    /// Propagates attached/detached state through native nodes.
    ///
    /// Returns `None` without touching anything when the schema has no
    /// detachedness field or no `native` node type; callers then fall back
    /// to the `Detached ` name prefix.
    pub fn propagate_detachedness(&mut self) -> Option<DetachednessStats> {
        if self.layout.require_detachedness().is_err() {
            warn!("snapshot has no detachedness field; falling back to name prefixes");
            return None;
        }
        let native = match self.layout.require_native_type() {
            Ok(native) => native,
            Err(_) => {
                warn!("snapshot declares no native node type; skipping detachedness");
                return None;
            }
        };

        let node_count = self.node_count();
        let mut visited = vec![false; node_count];
        let mut attached: Vec<usize> = Vec::new();
        let mut detached: Vec<usize> = Vec::new();
        let mut stats = DetachednessStats::default();

        for ordinal in 0..node_count {
            let state = Detachedness::from_raw(self.detachedness[ordinal]);
            if state == Detachedness::Unknown {
                continue;
            }
            self.visit_for_detachedness(
                ordinal,
                state,
                native,
                &mut visited,
                &mut attached,
                &mut detached,
            );
        }

        while let Some(ordinal) = attached.pop() {
            stats.attached += 1;
            self.propagate_to_children(
                ordinal,
                Detachedness::Attached,
                native,
                &mut visited,
                &mut attached,
                &mut detached,
            );
        }

        while let Some(ordinal) = detached.pop() {
            if Detachedness::from_raw(self.detachedness[ordinal]) == Detachedness::Attached {
                continue;
            }
            stats.detached += 1;
            self.propagate_to_children(
                ordinal,
                Detachedness::Detached,
                native,
                &mut visited,
                &mut attached,
                &mut detached,
            );
        }

        debug!(
            attached = stats.attached,
            detached = stats.detached,
            "detachedness propagated"
        );
        Some(stats)
    }

    fn visit_for_detachedness(
        &mut self,
        ordinal: usize,
        state: Detachedness,
        native: u64,
        visited: &mut [bool],
        attached: &mut Vec<usize>,
        detached: &mut Vec<usize>,
    ) {
        if visited[ordinal] {
            return;
        }
        visited[ordinal] = true;
        // State never flows through JavaScript objects.
        if self.node_type_value(ordinal) != native {
            return;
        }
        self.detachedness[ordinal] = state as u8;
        match state {
            Detachedness::Attached => attached.push(ordinal),
            Detachedness::Detached => detached.push(ordinal),
            Detachedness::Unknown => {}
        }
    }

    fn propagate_to_children(
        &mut self,
        parent: usize,
        state: Detachedness,
        native: u64,
        visited: &mut [bool],
        attached: &mut Vec<usize>,
        detached: &mut Vec<usize>,
    ) {
        let ids = self.layout.edge_type_ids.clone();
        for edge in self.edge_range(parent) {
            let edge_type = self.edge_type_value(edge);
            if is_type(edge_type, ids.hidden)
                || is_type(edge_type, ids.invisible)
                || is_type(edge_type, ids.weak)
            {
                continue;
            }
            let child = self.edge_target(edge);
            self.visit_for_detachedness(child, state, native, visited, attached, detached);
        }
    }
}
