//! Clustering configuration.
//!
//! All structs deserialize from partial JSON; missing keys take defaults.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// Which similarity strategy groups traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Heuristic,
    Ml,
}

/// Linkage criterion for hierarchical clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    #[default]
    Single,
    Average,
}

/// Weighted-alignment similarity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Minimum matched/total ratio for two traces to share a cluster.
    pub similarity_threshold: f64,
    /// `is_similar` stops once the ratio is certain to stay above this.
    pub early_stop_ratio: f64,
    /// Positions compared before an early stop is allowed.
    pub min_steps_before_early_stop: usize,
    /// Landmark node or edge names to align on, in preference order.
    pub anchor_names: Vec<String>,
    /// Per-name weight decay for node elements.
    pub node_decay: HashMap<String, f64>,
    /// Per-name weight decay for edge elements.
    pub edge_decay: HashMap<String, f64>,
    pub default_node_decay: f64,
    pub default_edge_decay: f64,
    pub node_pair_weight: f64,
    pub edge_pair_weight: f64,
    /// Weight floor at the first position.
    pub floor_start: f64,
    /// Amount the floor shrinks per position.
    pub floor_step: f64,
    /// Regexes; two names both matching one pattern are similar.
    pub synonyms: Vec<String>,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        let table = |entries: &[(&str, f64)]| {
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<HashMap<_, _>>()
        };
        HeuristicConfig {
            similarity_threshold: 0.8,
            early_stop_ratio: 0.9,
            min_steps_before_early_stop: 4,
            anchor_names: Vec::new(),
            node_decay: table(&[
                ("Array", 0.6),
                ("(object elements)", 0.6),
                ("(array elements)", 0.6),
                ("Map", 0.7),
                ("Set", 0.7),
                ("system / Context", 0.8),
            ]),
            edge_decay: table(&[("elements", 0.6), ("table", 0.7), ("context", 0.8)]),
            default_node_decay: 0.9,
            default_edge_decay: 0.9,
            node_pair_weight: 1.0,
            edge_pair_weight: 0.5,
            floor_start: 0.2,
            floor_step: 0.01,
            synonyms: vec![
                r"^\((object|array) elements\)$".to_string(),
                r"^(Weak)?(Map|Set)$".to_string(),
                r"^(Detached )?HTML\w*Element$".to_string(),
                r"^(system / )?Context$".to_string(),
            ],
        }
    }
}

/// TF-IDF plus hierarchical clustering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlConfig {
    /// Terms in more than this fraction of documents are dropped.
    pub max_df: f64,
    /// Largest linkage distance still merged into one cluster.
    pub max_distance_threshold: f64,
    pub linkage: Linkage,
    pub ngram_min: usize,
    pub ngram_max: usize,
}

impl Default for MlConfig {
    fn default() -> Self {
        MlConfig {
            max_df: 0.8,
            max_distance_threshold: 0.5,
            linkage: Linkage::Single,
            ngram_min: 1,
            ngram_max: 3,
        }
    }
}

/// Top-level clustering configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub strategy: Strategy,
    /// Cut traces after the first detached node.
    pub truncate_at_detached: bool,
    pub heuristic: HeuristicConfig,
    pub ml: MlConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            strategy: Strategy::Heuristic,
            truncate_at_detached: true,
            heuristic: HeuristicConfig::default(),
            ml: MlConfig::default(),
        }
    }
}

fn check(name: &'static str, value: f64, valid: bool) -> Result<(), ClusterError> {
    if valid && value.is_finite() {
        Ok(())
    } else {
        Err(ClusterError::InvalidThreshold { name, value })
    }
}

impl HeuristicConfig {
    pub fn validate(&self) -> Result<(), ClusterError> {
        let t = self.similarity_threshold;
        check("similarity_threshold", t, t > 0.0 && t <= 1.0)?;
        let r = self.early_stop_ratio;
        check("early_stop_ratio", r, r > 0.0 && r <= 1.0)?;
        for (name, value) in [
            ("default_node_decay", self.default_node_decay),
            ("default_edge_decay", self.default_edge_decay),
        ] {
            check(name, value, value > 0.0 && value <= 1.0)?;
        }
        for &decay in self.node_decay.values().chain(self.edge_decay.values()) {
            check("decay", decay, decay > 0.0 && decay <= 1.0)?;
        }
        check("node_pair_weight", self.node_pair_weight, self.node_pair_weight > 0.0)?;
        check("edge_pair_weight", self.edge_pair_weight, self.edge_pair_weight > 0.0)?;
        check("floor_start", self.floor_start, self.floor_start >= 0.0)?;
        check("floor_step", self.floor_step, self.floor_step >= 0.0)
    }
}

impl MlConfig {
    pub fn validate(&self) -> Result<(), ClusterError> {
        check("max_df", self.max_df, self.max_df > 0.0 && self.max_df <= 1.0)?;
        let d = self.max_distance_threshold;
        check("max_distance_threshold", d, d >= 0.0)?;
        let ngrams_ok = self.ngram_min >= 1 && self.ngram_min <= self.ngram_max;
        check("ngram_min", self.ngram_min as f64, ngrams_ok)
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), ClusterError> {
        self.heuristic.validate()?;
        self.ml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ClusterConfig::default().validate().unwrap();
    }

    #[test]
    fn strategy_parses_from_partial_json() {
        let config: ClusterConfig =
            serde_json::from_str(r#"{"strategy": "ml", "ml": {"linkage": "average"}}"#).unwrap();
        assert_eq!(config.strategy, Strategy::Ml);
        assert_eq!(config.ml.linkage, Linkage::Average);
        assert_eq!(config.ml.max_df, 0.8);
        assert_eq!(config.heuristic.similarity_threshold, 0.8);
        assert!(config.truncate_at_detached);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = ClusterConfig::default();
        config.ml.max_df = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ClusterError::InvalidThreshold { name: "max_df", .. })
        ));

        let mut config = ClusterConfig::default();
        config.heuristic.similarity_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = ClusterConfig::default();
        config.ml.ngram_min = 4;
        assert!(matches!(
            config.validate(),
            Err(ClusterError::InvalidThreshold { name: "ngram_min", .. })
        ));
    }
}
