//! Traversal configuration shared by the dominator engine and the path
//! annotator.

use serde::{Deserialize, Serialize};

/// Which edges and nodes the graph algorithms may walk through, and how the
/// path annotator ranks roots and edges.
///
/// Deserializes from partial JSON; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Nodes with one of these names are never entered.
    pub node_name_block_list: Vec<String>,
    /// Edges with one of these names are never followed.
    pub edge_name_block_list: Vec<String>,
    /// Edge names followed only when nothing better is left on a level
    /// (React fiber back-links and similar bookkeeping).
    pub less_preferable_edge_names: Vec<String>,
    /// Target node names entered only when nothing better is left.
    pub less_preferable_node_names: Vec<String>,
    /// Root categories searched only after every other root is exhausted.
    pub low_priority_root_names: Vec<String>,
    /// Demote the root categories in `demoted_root_names` to low priority.
    pub prioritize_roots: bool,
    /// Substrings of root names demoted when `prioritize_roots` is set.
    pub demoted_root_names: Vec<String>,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        TraversalConfig {
            node_name_block_list: Vec::new(),
            edge_name_block_list: Vec::new(),
            less_preferable_edge_names: vec![
                "return".to_string(),
                "alternate".to_string(),
                "_debugOwner".to_string(),
            ],
            less_preferable_node_names: vec!["InternalNode".to_string()],
            low_priority_root_names: vec!["(Unknown)".to_string()],
            prioritize_roots: true,
            demoted_root_names: vec![
                "Blink cross-thread roots".to_string(),
                "Pending activities".to_string(),
            ],
        }
    }
}

impl TraversalConfig {
    /// Whether a root with this name is searched in the low-priority round.
    pub fn is_low_priority_root(&self, name: &str) -> bool {
        if self.low_priority_root_names.iter().any(|n| n == name) {
            return true;
        }
        self.prioritize_roots && self.demoted_root_names.iter().any(|n| name.contains(n.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: TraversalConfig =
            serde_json::from_str(r#"{"edge_name_block_list": ["__proto__"]}"#).unwrap();
        assert_eq!(config.edge_name_block_list, vec!["__proto__".to_string()]);
        assert_eq!(config.low_priority_root_names, vec!["(Unknown)".to_string()]);
        assert!(config.prioritize_roots);
    }

    #[test]
    fn demotion_follows_prioritize_flag() {
        let mut config = TraversalConfig::default();
        assert!(config.is_low_priority_root("(Unknown)"));
        assert!(config.is_low_priority_root("(Blink cross-thread roots)"));
        assert!(!config.is_low_priority_root("(GC roots)"));

        config.prioritize_roots = false;
        assert!(!config.is_low_priority_root("(Pending activities)"));
        assert!(config.is_low_priority_root("(Unknown)"));
    }
}
