pub mod config;
pub mod detached;
pub mod dominator;
pub mod edge;
pub mod error;
pub mod filter;
pub mod id;
pub mod node;
pub mod path;
pub mod raw;
pub mod schema;
pub mod snapshot;

/// Fixture builder shared by this workspace's tests; not a stable API.
#[doc(hidden)]
pub mod testing;

// Re-export commonly used types
pub use config::TraversalConfig;
pub use detached::DetachednessStats;
pub use edge::{EdgeName, HeapEdge};
pub use error::SnapshotError;
pub use filter::{AllowAll, EdgeFilter};
pub use id::{EdgeIndex, NodeIndex};
pub use node::{Detachedness, HeapNode, NodeAttributes, NodeLocation};
pub use path::{HeapPath, PathStep};
pub use raw::{RawSnapshot, SnapshotMeta};
pub use snapshot::HeapSnapshot;
