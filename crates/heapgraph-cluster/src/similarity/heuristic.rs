//! Weighted lockstep alignment of two traces.
//!
//! Both traces are aligned at a shared anchor element and walked together.
//! Every position contributes `(w1 + w2) * pair_weight` to the total, and to
//! the matched score when the two elements are the same or similar. Weights
//! decay per element so that positions deep inside containers count less,
//! but never below a slowly shrinking floor. `is_similar` stops early once
//! the remaining positions can no longer pull the ratio below the early-stop
//! ratio.

use regex::Regex;
use tracing::trace;

use crate::config::HeuristicConfig;
use crate::error::ClusterError;
use crate::similarity::TraceSimilarity;
use crate::trace::{LeakTrace, TraceElement};

const WINDOW_PREFIX: &str = "Window";
const REACT_PREFIX: &str = "__react";

pub struct HeuristicSimilarity {
    config: HeuristicConfig,
    synonyms: Vec<Regex>,
}

impl HeuristicSimilarity {
    pub fn new(config: HeuristicConfig) -> Result<Self, ClusterError> {
        config.validate()?;
        let synonyms = config
            .synonyms
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HeuristicSimilarity { config, synonyms })
    }

    /// Matched weight over total weight, in `[0, 1]`.
    ///
    /// Symmetric in its arguments. Two empty traces score 1, an empty and a
    /// non-empty trace score 0.
    pub fn score(&self, a: &LeakTrace, b: &LeakTrace) -> f64 {
        self.walk(a, b, None)
    }

    /// Compares the traces position by position.
    ///
    /// With `stop_above`, the walk ends as soon as the ratio stays above it
    /// even if every later position mismatches, and returns that lower bound.
    fn walk(&self, a: &LeakTrace, b: &LeakTrace, stop_above: Option<f64>) -> f64 {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => return 1.0,
            (true, false) | (false, true) => return 0.0,
            (false, false) => {}
        }
        let (start_a, start_b) = self.anchor(a, b);
        let left = &a.elements[start_a..];
        let right = &b.elements[start_b..];
        let (contributions, total) = self.weights(left, right);

        let mut matched = 0.0;
        let mut previous_nodes_match = false;
        let positions = left.iter().zip(right).zip(&contributions);
        for (step, ((e1, e2), contribution)) in positions.enumerate() {
            let matches = self.is_same(e1, e2, previous_nodes_match) || self.is_synonym(e1, e2);
            if matches {
                matched += contribution;
            }
            if e1.is_node() && e2.is_node() {
                previous_nodes_match = matches;
            }

            if let Some(limit) = stop_above {
                if step + 1 >= self.config.min_steps_before_early_stop && matched / total > limit {
                    trace!(step, ratio = matched / total, "early stop");
                    return matched / total;
                }
            }
        }
        matched / total
    }

    /// Contribution of every lockstep position, and the total weight with
    /// the unmatched tails included.
    fn weights(&self, left: &[TraceElement], right: &[TraceElement]) -> (Vec<f64>, f64) {
        let steps = left.len().min(right.len());
        let mut contributions = Vec::with_capacity(steps);
        let mut w1 = 1.0;
        let mut w2 = 1.0;
        for (step, (e1, e2)) in left.iter().zip(right).enumerate() {
            let pair_weight = match (e1, e2) {
                (TraceElement::Edge(_), TraceElement::Edge(_)) => self.config.edge_pair_weight,
                _ => self.config.node_pair_weight,
            };
            contributions.push((w1 + w2) * pair_weight);

            let floor = self.floor(step);
            w1 = f64::max(w1 * self.decay(e1), floor);
            w2 = f64::max(w2 * self.decay(e2), floor);
        }

        let rem1 = self.remainder(&left[steps..], w1, steps);
        let rem2 = self.remainder(&right[steps..], w2, steps);
        let total = contributions.iter().sum::<f64>() + (rem1 + rem2);
        (contributions, total)
    }

    /// First configured landmark present in both traces with the same kind;
    /// otherwise both traces start at their first element.
    fn anchor(&self, a: &LeakTrace, b: &LeakTrace) -> (usize, usize) {
        let find = |trace: &LeakTrace, name: &str| {
            trace
                .elements
                .iter()
                .position(|element| element.label() == name)
        };
        for name in &self.config.anchor_names {
            if let (Some(i), Some(j)) = (find(a, name), find(b, name)) {
                if a.elements[i].is_node() == b.elements[j].is_node() {
                    return (i, j);
                }
            }
        }
        (0, 0)
    }

    fn is_same(&self, e1: &TraceElement, e2: &TraceElement, previous_nodes_match: bool) -> bool {
        match (e1, e2) {
            (TraceElement::Node(n1), TraceElement::Node(n2)) => {
                (n1.name == n2.name && n1.node_type == n2.node_type)
                    || (n1.name.starts_with(WINDOW_PREFIX) && n2.name.starts_with(WINDOW_PREFIX))
            }
            (TraceElement::Edge(x1), TraceElement::Edge(x2)) => {
                if x1.name_or_index == x2.name_or_index && x1.edge_type == x2.edge_type {
                    return true;
                }
                if x1.name_or_index.is_index() && x2.name_or_index.is_index() {
                    return x1.edge_type == x2.edge_type && previous_nodes_match;
                }
                let (l1, l2) = (x1.name_or_index.to_string(), x2.name_or_index.to_string());
                match (react_key(&l1), react_key(&l2)) {
                    (Some(k1), Some(k2)) => k1 == k2,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn is_synonym(&self, e1: &TraceElement, e2: &TraceElement) -> bool {
        if e1.is_node() != e2.is_node() {
            return false;
        }
        let (l1, l2) = (e1.label(), e2.label());
        self.synonyms
            .iter()
            .any(|pattern| pattern.is_match(&l1) && pattern.is_match(&l2))
    }

    fn decay(&self, element: &TraceElement) -> f64 {
        match element {
            TraceElement::Node(node) => self
                .config
                .node_decay
                .get(&node.name)
                .copied()
                .unwrap_or(self.config.default_node_decay),
            TraceElement::Edge(edge) => self
                .config
                .edge_decay
                .get(&edge.name_or_index.to_string())
                .copied()
                .unwrap_or(self.config.default_edge_decay),
        }
    }

    fn floor(&self, step: usize) -> f64 {
        f64::max(0.0, self.config.floor_start - step as f64 * self.config.floor_step)
    }

    /// Weight of the unmatched tail of one trace.
    fn remainder(&self, tail: &[TraceElement], mut weight: f64, first_step: usize) -> f64 {
        let mut sum = 0.0;
        for (offset, element) in tail.iter().enumerate() {
            let pair_weight = if element.is_node() {
                self.config.node_pair_weight
            } else {
                self.config.edge_pair_weight
            };
            sum += weight * pair_weight;
            weight = f64::max(weight * self.decay(element), self.floor(first_step + offset));
        }
        sum
    }
}

/// `__reactFiber$abc123` and `__reactFiber$zz9` share the key `__reactFiber`.
fn react_key(label: &str) -> Option<&str> {
    if !label.starts_with(REACT_PREFIX) {
        return None;
    }
    label.split_once('$').map(|(key, _)| key)
}

impl TraceSimilarity for HeuristicSimilarity {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn is_similar(&self, a: &LeakTrace, b: &LeakTrace) -> bool {
        let threshold = self.config.similarity_threshold;
        let stop = self.config.early_stop_ratio.max(threshold);
        self.walk(a, b, Some(stop)) >= threshold
    }
}
