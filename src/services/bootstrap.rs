//! Startup and shutdown policies for the graph.
//!
//! Startup prefers the latest snapshot. A missing, unreadable or rejected
//! snapshot triggers a full rebuild from rows followed by an immediate save,
//! so the next start is fast again. Shutdown saves best-effort.

use crate::graph::{GraphCounts, GraphState, GraphStore, snapshot};
use crate::models::{GenreId, UserId};
use crate::storage::{RowSource, SnapshotStore};
use crate::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::instrument;

/// Where the startup graph came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BootSource {
    /// Decoded from the latest snapshot.
    Snapshot,
    /// Rebuilt from interaction rows.
    Rows,
}

/// Summary of a startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootReport {
    /// Where the graph came from.
    pub source: BootSource,
    /// Graph counts after loading.
    pub counts: GraphCounts,
    /// Why the snapshot was not used, if it existed but was rejected.
    pub snapshot_error: Option<String>,
    /// Whether a fresh snapshot was written after a rebuild.
    pub snapshot_saved: bool,
}

/// Loads the graph: snapshot first, rows as fallback.
///
/// # Errors
///
/// Returns an error only if the rebuild from rows fails. Snapshot read,
/// decode and save failures are logged and recovered from.
#[instrument(skip_all, fields(snapshot_store = snapshots.backend_name()))]
pub fn load_graph(
    rows: &dyn RowSource,
    snapshots: &dyn SnapshotStore,
) -> Result<(GraphStore, BootReport)> {
    let start = Instant::now();
    let mut snapshot_error = None;

    match snapshots.load_latest() {
        Ok(Some(bytes)) => match snapshot::decode(&bytes) {
            Ok(state) => {
                let graph = GraphStore::from_state(state);
                let counts = graph.counts();
                tracing::info!(
                    users = counts.users,
                    items = counts.items,
                    edges = counts.edges,
                    bytes = bytes.len(),
                    elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Graph loaded from snapshot"
                );
                return Ok((
                    graph,
                    BootReport {
                        source: BootSource::Snapshot,
                        counts,
                        snapshot_error: None,
                        snapshot_saved: false,
                    },
                ));
            },
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot rejected, rebuilding from rows");
                metrics::counter!("snapshot_rejected_total").increment(1);
                snapshot_error = Some(e.to_string());
            },
        },
        Ok(None) => tracing::info!("No snapshot found, rebuilding from rows"),
        Err(e) => {
            tracing::warn!(error = %e, "Snapshot unreadable, rebuilding from rows");
            snapshot_error = Some(e.to_string());
        },
    }

    let graph = rebuild_from_rows(rows)?;
    let counts = graph.counts();
    let snapshot_saved = save_snapshot(&graph, snapshots);
    tracing::info!(
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        snapshot_saved,
        "Graph rebuilt from rows"
    );

    Ok((
        graph,
        BootReport {
            source: BootSource::Rows,
            counts,
            snapshot_error,
            snapshot_saved,
        },
    ))
}

/// Builds a fresh graph from catalog, preference and interaction rows.
///
/// Every catalog item gets its genre tag, so items without likes still
/// appear in the catalog tier.
///
/// # Errors
///
/// Returns an error if any row set cannot be read.
pub fn rebuild_from_rows(rows: &dyn RowSource) -> Result<GraphStore> {
    let graph = GraphStore::new();
    refresh_from_rows(&graph, rows)?;
    Ok(graph)
}

/// Reloads genres, preferences and edges into an existing graph.
///
/// The new state is built aside and swapped in under one write guard.
///
/// # Errors
///
/// Returns an error if any row set cannot be read; the graph is unchanged
/// in that case.
pub fn refresh_from_rows(graph: &GraphStore, rows: &dyn RowSource) -> Result<GraphCounts> {
    let catalog = rows.catalog()?;
    let preferences = rows.preferences()?;
    let interactions = rows.interactions()?;

    let mut by_user: BTreeMap<UserId, BTreeSet<GenreId>> = BTreeMap::new();
    for row in preferences {
        by_user.entry(row.user_id).or_default().insert(row.genre_id);
    }

    let mut state = GraphState::new();
    for item in &catalog {
        state.set_item_genre(item.id, item.genre().id());
    }
    for (user_id, genres) in by_user {
        state.set_user_preferences(user_id, genres);
    }
    state.load_interactions(interactions);
    let counts = state.counts();
    graph.replace(state);
    tracing::info!(
        users = counts.users,
        items = counts.items,
        edges = counts.edges,
        "Graph loaded from rows"
    );
    Ok(counts)
}

/// Encodes the graph and saves it. Returns `false` on failure.
///
/// Encoding holds the read guard; the write happens after it is released.
pub fn save_snapshot(graph: &GraphStore, snapshots: &dyn SnapshotStore) -> bool {
    let bytes = snapshot::encode_store(graph);
    match snapshots.save(&bytes) {
        Ok(()) => {
            tracing::info!(
                bytes = bytes.len(),
                store = snapshots.backend_name(),
                "Snapshot saved"
            );
            true
        },
        Err(e) => {
            tracing::warn!(error = %e, store = snapshots.backend_name(), "Snapshot save failed");
            metrics::counter!("snapshot_save_failures_total").increment(1);
            false
        },
    }
}

/// Best-effort shutdown save. Never fails; the outcome is logged.
#[instrument(skip_all)]
pub fn shutdown(graph: &GraphStore, snapshots: &dyn SnapshotStore) -> bool {
    let saved = save_snapshot(graph, snapshots);
    if !saved {
        tracing::warn!("Exiting without a fresh snapshot; next start will rebuild or use the previous one");
    }
    saved
}
