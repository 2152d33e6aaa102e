//! In-memory bipartite interaction graph.
//!
//! The graph layer owns the user↔item adjacency, item genre tags and user
//! genre preferences, and knows how to encode itself into a snapshot blob.
//!
//! # Locking
//!
//! [`GraphStore`] guards a [`GraphState`] with a task-fair reader/writer lock.
//! Mutations hold the write lock only for the adjacency update. Multi-step
//! readers (ranking traversals, snapshot encoding) take one read guard via
//! [`GraphStore::read`] and see a single consistent state for their whole run.

mod neighbors;
pub mod snapshot;
mod store;

pub use neighbors::NeighborList;
pub use snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION, SnapshotError};
pub use store::{GraphCounts, GraphState, GraphStore};
