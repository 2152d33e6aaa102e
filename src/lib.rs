//! # graphrec
//!
//! An in-memory recommendation engine over a bipartite user↔item "likes" graph.
//!
//! graphrec keeps the interaction graph in process memory, ranks candidate
//! items with weighted breadth-first collaborative filtering or a Monte Carlo
//! personalized PageRank, and always answers with something: when
//! personalization has nothing to offer it falls back to globally popular
//! items and finally to the catalog.
//!
//! ## Features
//!
//! - Bipartite graph store with O(1) neighbor lookup in both directions
//! - Two ranking algorithms (BFS co-occurrence, personalized PageRank)
//! - Three-tier fallback (personalized, popularity, catalog)
//! - TTL result cache kept coherent with graph mutations (memory or Redis)
//! - Checksummed binary snapshots for fast restarts
//!
//! ## Example
//!
//! ```rust,ignore
//! use graphrec::{GraphStore, RecommendRequest, RecommendationEngine};
//!
//! let engine = RecommendationEngine::with_defaults(Arc::new(GraphStore::new()));
//! engine.record_edge(999, 101, 1_700_000_000)?;
//! engine.record_edge(888, 101, 1_700_000_000)?;
//! engine.record_edge(888, 104, 1_700_000_000)?;
//!
//! let recs = engine.recommend(&RecommendRequest::new(999, 5))?;
//! assert_eq!(recs.item_ids(), vec![104]);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod cache;
pub mod cli;
pub mod config;
pub mod graph;
pub mod models;
pub mod observability;
pub mod rank;
pub mod services;
pub mod storage;

pub use cache::{CachedRecommendation, InMemoryCache, RecommendationCache, ResilientCache};
pub use config::GraphrecConfig;
pub use graph::{GraphCounts, GraphStore, SnapshotError};
pub use models::{
    Algorithm, Genre, InteractionRow, ItemMeta, RecommendRequest, Recommendation,
    RecommendedItem, Tier,
};
pub use services::{FallbackOrchestrator, RecommendationEngine};
pub use storage::{FileSnapshotStore, RowSource, SnapshotStore, SqliteRowStore};

/// Error type for graphrec operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Negative or out-of-range `k`, walk count, depth or id |
/// | `OperationFailed` | SQLite, filesystem, CSV or cache backend failures |
/// | `Snapshot` | A snapshot blob is truncated, corrupt or of another version |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised synchronously, before any traversal begins.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` queries or filesystem I/O fail
    /// - A CSV import row cannot be parsed
    /// - A cache backend cannot be reached
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A snapshot could not be decoded.
    ///
    /// Always recoverable: callers rebuild from interaction rows.
    #[error("snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and any displayable cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for graphrec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("k must be non-negative".to_string());
        assert_eq!(err.to_string(), "invalid input: k must be non-negative");

        let err = Error::operation("load_rows", "disk on fire");
        assert_eq!(err.to_string(), "operation 'load_rows' failed: disk on fire");
    }

    #[test]
    fn test_snapshot_error_converts() {
        let err: Error = SnapshotError::BadMagic.into();
        assert!(matches!(err, Error::Snapshot(SnapshotError::BadMagic)));
        assert!(err.to_string().starts_with("snapshot rejected"));
    }

    #[test]
    fn test_current_timestamp() {
        let ts = current_timestamp();
        // Should be after 2020-01-01
        assert!(ts > 1_577_836_800);
    }
}
