//! Heap snapshot leak analyzer CLI.
//!
//! Provides the `heapgraph` binary. Every subcommand loads a `.heapsnapshot`
//! file, runs the analysis passes (detachedness, dominators, shortest paths)
//! and prints machine-readable JSON to stdout. Diagnostics go to stderr
//! through `tracing`; set `RUST_LOG` to change the level.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use heapgraph_cluster::{
    cluster_paths, diff_clusters, sample_nodes, ClusterConfig, LeakTrace, LeakTracePath, Strategy,
};
use heapgraph_core::{
    AllowAll, HeapNode, HeapSnapshot, NodeIndex, RawSnapshot, SnapshotError, TraversalConfig,
};

/// Heap snapshot leak analyzer.
#[derive(Parser)]
#[command(name = "heapgraph", about = "Heap snapshot leak analyzer")]
struct Cli {
    /// JSON file with `traversal` and `cluster` settings.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print graph statistics and the largest retainers.
    Summary {
        /// Path to the `.heapsnapshot` file.
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Number of nodes to list by retained size.
        #[arg(short, long, default_value_t = 20)]
        top: usize,
    },
    /// Print the preferred path from a GC root to one node.
    Path {
        /// Path to the `.heapsnapshot` file.
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Node id as shown in DevTools (without the `@`).
        #[arg(short, long)]
        id: u64,
    },
    /// Cluster the retainer paths of leak candidates.
    Cluster {
        /// Path to the `.heapsnapshot` file.
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Treat every object with this constructor name as leaked.
        #[arg(long, conflicts_with = "detached", required_unless_present = "detached")]
        class: Option<String>,

        /// Treat every detached native object as leaked.
        #[arg(long)]
        detached: bool,

        /// Similarity strategy (overrides the config file).
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Cluster at most this many candidates, chosen at random.
        #[arg(long)]
        sample: Option<usize>,

        /// Seed for `--sample`.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// JSON array of previously recorded traces to diff against.
        #[arg(long)]
        recorded: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Heuristic,
    Ml,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Heuristic => Strategy::Heuristic,
            StrategyArg::Ml => Strategy::Ml,
        }
    }
}

/// Contents of the `--config` file; both sections are optional.
#[derive(Default, Deserialize)]
#[serde(default)]
struct Settings {
    traversal: TraversalConfig,
    cluster: ClusterConfig,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(code) => process::exit(code),
    };

    let exit_code = match cli.command {
        Commands::Summary { snapshot, top } => run_summary(&snapshot, top, &settings),
        Commands::Path { snapshot, id } => run_path(&snapshot, id, &settings),
        Commands::Cluster {
            snapshot,
            class,
            detached: _,
            strategy,
            sample,
            seed,
            recorded,
        } => {
            let mut settings = settings;
            if let Some(strategy) = strategy {
                settings.cluster.strategy = strategy.into();
            }
            // clap guarantees `--detached` when no class is given.
            let candidates = match class {
                Some(class) => Candidates::Class(class),
                None => Candidates::Detached,
            };
            run_cluster(&snapshot, candidates, sample.map(|n| (n, seed)), recorded, &settings)
        }
    };
    process::exit(exit_code);
}

/// Which nodes count as leaked.
enum Candidates {
    Class(String),
    Detached,
}

/// Reads the optional settings file. Errors carry the exit code.
fn load_settings(path: Option<&Path>) -> Result<Settings, i32> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read config '{}': {}", path.display(), e);
        3
    })?;
    serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error: invalid config '{}': {}", path.display(), e);
        1
    })
}

/// Loads a snapshot and runs every analysis pass.
///
/// Returns exit code on failure: 1 = malformed snapshot, 3 = I/O error.
fn load_prepared(path: &Path, settings: &Settings) -> Result<HeapSnapshot, i32> {
    let file = File::open(path).map_err(|e| {
        eprintln!("Error: failed to open snapshot '{}': {}", path.display(), e);
        3
    })?;
    let raw =
        RawSnapshot::from_reader(BufReader::new(file)).map_err(|e| snapshot_error(path, e))?;
    let mut snapshot = HeapSnapshot::from_raw(raw).map_err(|e| snapshot_error(path, e))?;
    info!(
        nodes = snapshot.node_count(),
        edges = snapshot.edge_count(),
        "loaded snapshot"
    );
    snapshot
        .prepare(&settings.traversal, &AllowAll)
        .map_err(|e| snapshot_error(path, e))?;
    Ok(snapshot)
}

fn snapshot_error(path: &Path, error: SnapshotError) -> i32 {
    eprintln!("Error: snapshot '{}': {}", path.display(), error);
    match error {
        SnapshotError::Io(_) => 3,
        _ => 1,
    }
}

fn node_json(node: &HeapNode<'_>) -> serde_json::Value {
    json!({
        "id": node.id(),
        "name": node.name(),
        "type": node.type_name(),
        "self_size": node.self_size(),
        "retained_size": node.retained_size().ok(),
        "detached": node.is_detached(),
    })
}

fn print_json(value: &impl serde::Serialize) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: failed to serialize output: {}", e);
            1
        }
    }
}

/// Execute the summary subcommand.
///
/// Returns exit code: 0 = success, 1 = malformed snapshot, 3 = I/O error.
fn run_summary(path: &Path, top: usize, settings: &Settings) -> i32 {
    let snapshot = match load_prepared(path, settings) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let mut largest: Vec<HeapNode<'_>> = snapshot.nodes().filter(|n| !n.is_root()).collect();
    largest.sort_by(|a, b| {
        let (ra, rb) = (a.retained_size().unwrap_or(0.0), b.retained_size().unwrap_or(0.0));
        rb.total_cmp(&ra)
    });
    largest.truncate(top);

    let detached = snapshot.nodes().filter(|n| n.is_detached()).count();
    let unreachable = snapshot
        .nodes()
        .filter(|n| !n.is_root() && !n.has_path_edge())
        .count();
    print_json(&json!({
        "nodes": snapshot.node_count(),
        "edges": snapshot.edge_count(),
        "total_self_size": snapshot.total_self_size(),
        "detached_nodes": detached,
        "nodes_without_path": unreachable,
        "largest": largest.iter().map(node_json).collect::<Vec<_>>(),
    }))
}

/// Execute the path subcommand.
///
/// Returns exit code: 0 = success (including "no path"), 1 = unknown id or
/// malformed snapshot, 3 = I/O error.
fn run_path(path: &Path, id: u64, settings: &Settings) -> i32 {
    let snapshot = match load_prepared(path, settings) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let Some(index) = snapshot.index_of_id(id) else {
        eprintln!("Error: no node with id @{}", id);
        return 1;
    };
    let trace_path = snapshot
        .path_to_gc_roots(index)
        .and_then(|p| LeakTracePath::from_heap_path(&snapshot, &p));
    match trace_path {
        Some(trace_path) => print_json(&trace_path),
        None => {
            info!(id, "node is not reachable from any GC root");
            print_json(&serde_json::Value::Null)
        }
    }
}

/// Execute the cluster subcommand.
///
/// Returns exit code: 0 = success, 1 = invalid input or configuration,
/// 3 = I/O error.
fn run_cluster(
    path: &Path,
    candidates: Candidates,
    sample: Option<(usize, u64)>,
    recorded: Option<PathBuf>,
    settings: &Settings,
) -> i32 {
    let recorded = match recorded.as_deref().map(load_recorded).transpose() {
        Ok(r) => r,
        Err(code) => return code,
    };
    let snapshot = match load_prepared(path, settings) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let mut leaked: Vec<NodeIndex> = match &candidates {
        Candidates::Class(class) => snapshot
            .nodes_by_name(class)
            .iter()
            .map(|n| n.index())
            .collect(),
        Candidates::Detached => snapshot
            .nodes()
            .filter(|n| n.is_detached())
            .map(|n| n.index())
            .collect(),
    };
    if let Some((max, seed)) = sample {
        leaked = sample_nodes(&leaked, max, seed);
    }
    info!(candidates = leaked.len(), "clustering leak candidates");

    let clusters = match cluster_paths(&snapshot, &leaked, &settings.cluster) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: clustering failed: {}", e);
            return 1;
        }
    };
    match recorded {
        None => print_json(&clusters),
        Some(recorded) => match diff_clusters(&clusters, &recorded, &settings.cluster) {
            Ok(diff) => print_json(&diff),
            Err(e) => {
                eprintln!("Error: diff failed: {}", e);
                1
            }
        },
    }
}

/// Reads a JSON array of traces. Errors carry the exit code.
fn load_recorded(path: &Path) -> Result<Vec<LeakTrace>, i32> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read traces '{}': {}", path.display(), e);
        3
    })?;
    let traces: Vec<LeakTrace> = serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error: invalid traces '{}': {}", path.display(), e);
        1
    })?;
    for (i, trace) in traces.iter().enumerate() {
        if let Err(e) = trace.validate() {
            eprintln!("Error: trace {} in '{}': {}", i, path.display(), e);
            return Err(1);
        }
    }
    Ok(traces)
}
