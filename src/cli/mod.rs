//! Shared plumbing for the `graphrec` command-line binary.
//!
//! The binary's commands all work on the same wiring: a `SQLite` row store at
//! `paths.database_path`, a snapshot file at `paths.snapshot_path`, and an
//! engine booted from the two. [`App`] owns that wiring.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `import` | Load interaction and item CSV files into the row store |
//! | `rebuild` | Rebuild the graph from rows and write a fresh snapshot |
//! | `snapshot` | Write a snapshot of the current graph |
//! | `stats` | Show graph counts and where the graph was loaded from |
//! | `recommend` | Recommend items for one user |
//! | `like` / `unlike` | Add or remove an interaction |
//! | `genre` | Tag an item with a genre |
//! | `prefs` | Replace a user's preferred genres |
//! | `run` | Answer JSON commands read line by line from stdin |
//!
//! # Example Usage
//!
//! ```bash
//! graphrec import --interactions ratings.csv --items movies.csv
//! graphrec recommend 999 -k 5 --algorithm ppr
//! echo '{"op":"recommend","user_id":999,"k":5}' | graphrec run
//! ```

pub mod run;

pub use run::{LineCommand, LineResponse, ServeStats, handle_line, serve_lines};

use crate::config::GraphrecConfig;
use crate::graph::GraphCounts;
use crate::models::{Genre, GenreId, ItemId};
use crate::services::{self, BootReport, RecommendationEngine};
use crate::storage::{FileSnapshotStore, RowSource, SqliteRowStore};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A booted engine together with the stores it was loaded from.
pub struct App {
    engine: RecommendationEngine,
    rows: Arc<SqliteRowStore>,
    snapshots: FileSnapshotStore,
    boot: BootReport,
}

impl App {
    /// Opens the configured stores and boots the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the graph cannot
    /// be rebuilt from rows.
    pub fn open(config: &GraphrecConfig) -> Result<Self> {
        let rows = Arc::new(SqliteRowStore::open(config.paths.database_path())?);
        let snapshots = FileSnapshotStore::new(config.paths.snapshot_path());
        Self::with_stores(config, rows, snapshots)
    }

    /// Boots the engine from explicit stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be rebuilt from rows or the
    /// catalog cannot be read.
    pub fn with_stores(
        config: &GraphrecConfig,
        rows: Arc<SqliteRowStore>,
        snapshots: FileSnapshotStore,
    ) -> Result<Self> {
        let (graph, boot) = services::load_graph(rows.as_ref(), &snapshots)?;
        let engine = RecommendationEngine::from_config(Arc::new(graph), config)
            .with_row_store(Arc::clone(&rows));
        let items = engine.load_catalog(rows.catalog()?);
        tracing::debug!(items, source = ?boot.source, "Engine ready");
        Ok(Self {
            engine,
            rows,
            snapshots,
            boot,
        })
    }

    /// The engine.
    #[must_use]
    pub const fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    /// The row store mutations are written through to.
    #[must_use]
    pub const fn rows(&self) -> &Arc<SqliteRowStore> {
        &self.rows
    }

    /// The snapshot store.
    #[must_use]
    pub const fn snapshots(&self) -> &FileSnapshotStore {
        &self.snapshots
    }

    /// How the graph was loaded.
    #[must_use]
    pub const fn boot(&self) -> &BootReport {
        &self.boot
    }

    /// Reloads the graph and catalog from rows, then saves a snapshot.
    ///
    /// Cached results are dropped along with the old graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be read.
    pub fn rebuild(&self) -> Result<GraphCounts> {
        let counts = self.engine.reload_from_rows(self.rows.as_ref())?;
        services::bootstrap::save_snapshot(self.engine.graph(), &self.snapshots);
        Ok(counts)
    }

    /// Writes a snapshot now. Returns `false` if the write failed.
    pub fn save_snapshot(&self) -> bool {
        services::bootstrap::save_snapshot(self.engine.graph(), &self.snapshots)
    }

    /// Best-effort shutdown save.
    pub fn close(self) -> bool {
        services::shutdown(self.engine.graph(), &self.snapshots)
    }
}

/// Parses a genre name, rejecting names that map to nothing.
///
/// `"unknown"` itself is accepted.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for unrecognized names.
pub fn parse_genre(name: &str) -> Result<Genre> {
    let genre = Genre::parse(name);
    if genre == Genre::Unknown && !name.trim().eq_ignore_ascii_case("unknown") {
        return Err(Error::InvalidInput(format!("unknown genre: {name}")));
    }
    Ok(genre)
}

/// Parses a comma-separated list of genre names into tags.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if any name is unrecognized.
pub fn parse_genre_list(list: &str) -> Result<BTreeSet<GenreId>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_genre(s).map(Genre::id))
        .collect()
}

/// Parses a comma-separated list of item ids.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if any entry is not a non-negative integer.
pub fn parse_id_list(list: &str) -> Result<BTreeSet<ItemId>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ItemId>()
                .map_err(|_| Error::InvalidInput(format!("invalid item id: {s}")))
        })
        .collect()
}
