//! Snapshot blob store trait.

use crate::Result;

/// Persists encoded graph snapshots.
///
/// Stores only hold bytes; encoding and validation belong to
/// [`crate::graph::snapshot`].
pub trait SnapshotStore: Send + Sync {
    /// Returns the most recently saved blob, or `None` if nothing was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_latest(&self) -> Result<Option<Vec<u8>>>;

    /// Saves `bytes` as the latest blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written.
    fn save(&self, bytes: &[u8]) -> Result<()>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
