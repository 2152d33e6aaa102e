//! Storage layer.
//!
//! The graph lives in memory; storage holds what it is rebuilt from:
//! - **Rows**: interactions, catalog metadata and genre preferences
//!   ([`RowSource`], implemented by [`SqliteRowStore`])
//! - **Snapshots**: encoded graph blobs ([`SnapshotStore`], implemented by
//!   [`FileSnapshotStore`] and [`SqliteRowStore`])
//! - **Import**: CSV loaders that feed rows into the `SQLite` store

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod import;
pub mod snapshot;
pub mod sqlite;
pub mod traits;

pub use import::{CsvImporter, ImportStats};
pub use snapshot::FileSnapshotStore;
pub use sqlite::SqliteRowStore;
pub use traits::{RowSource, SnapshotStore};
