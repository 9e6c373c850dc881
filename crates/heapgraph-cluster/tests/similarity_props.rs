use proptest::prelude::*;

use heapgraph_cluster::{
    EdgeLabel, EdgeRecord, HeuristicConfig, HeuristicSimilarity, LeakTrace, MlConfig,
    MlSimilarity, NodeRecord, TraceElement, TraceSimilarity,
};

const NODE_NAMES: [&str; 8] = [
    "Window",
    "Array",
    "Map",
    "WeakMap",
    "(object elements)",
    "HTMLDivElement",
    "Store",
    "system / Context",
];
const EDGE_NAMES: [&str; 6] = ["0", "7", "items", "table", "context", "__reactFiber$ab"];

fn node(name: &str) -> TraceElement {
    TraceElement::Node(NodeRecord {
        id: 1,
        name: name.to_string(),
        node_type: "object".to_string(),
        self_size: 8,
        retained_size: None,
        detached: false,
    })
}

fn edge(label: &str) -> TraceElement {
    let (name_or_index, edge_type) = match label.parse::<u64>() {
        Ok(i) => (EdgeLabel::Index(i), "element"),
        Err(_) => (EdgeLabel::Name(label.to_string()), "property"),
    };
    TraceElement::Edge(EdgeRecord {
        name_or_index,
        edge_type: edge_type.to_string(),
    })
}

fn arb_trace() -> impl Strategy<Value = LeakTrace> {
    (
        0..NODE_NAMES.len(),
        prop::collection::vec((0..EDGE_NAMES.len(), 0..NODE_NAMES.len()), 0..12),
    )
        .prop_map(|(first, hops)| {
            let mut elements = vec![node(NODE_NAMES[first])];
            for (e, n) in hops {
                elements.push(edge(EDGE_NAMES[e]));
                elements.push(node(NODE_NAMES[n]));
            }
            LeakTrace::new(elements)
        })
}

proptest! {
    #[test]
    fn heuristic_is_reflexive_and_symmetric(a in arb_trace(), b in arb_trace()) {
        let s = HeuristicSimilarity::new(HeuristicConfig::default()).unwrap();
        prop_assert_eq!(s.score(&a, &a), 1.0);
        prop_assert!(s.is_similar(&a, &a));
        let ab = s.score(&a, &b);
        prop_assert_eq!(ab, s.score(&b, &a));
        prop_assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn ml_copies_always_share_a_cluster(t in arb_trace(), copies in 2usize..20) {
        let s = MlSimilarity::new(MlConfig::default()).unwrap();
        let traces = vec![t; copies];
        prop_assert_eq!(s.cluster(&traces).len(), 1);
    }

    #[test]
    fn clusters_partition_the_input(traces in prop::collection::vec(arb_trace(), 0..15)) {
        let heuristic = HeuristicSimilarity::new(HeuristicConfig::default()).unwrap();
        let ml = MlSimilarity::new(MlConfig::default()).unwrap();
        for clusters in [heuristic.cluster(&traces), ml.cluster(&traces)] {
            let mut seen: Vec<usize> = clusters.concat();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..traces.len()).collect::<Vec<_>>());
        }
    }
}
