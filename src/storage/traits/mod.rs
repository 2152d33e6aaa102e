//! Storage backend traits.

mod rows;
mod snapshot;

pub use rows::RowSource;
pub use snapshot::SnapshotStore;
