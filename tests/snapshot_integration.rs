//! Snapshot persistence integration tests.
//!
//! Covers the startup policy against real stores on disk: corrupt, foreign
//! and missing snapshots all fall back to a rebuild from rows followed by a
//! fresh save, and both snapshot stores keep only the latest blob.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use graphrec::graph::{GraphStore, SNAPSHOT_MAGIC, SnapshotError, snapshot};
use graphrec::models::{InteractionRow, ItemMeta};
use graphrec::services::{BootSource, load_graph, shutdown};
use graphrec::{FileSnapshotStore, SnapshotStore, SqliteRowStore};
use std::collections::BTreeSet;
use std::fs;
use tempfile::TempDir;

fn seeded_rows(dir: &TempDir) -> SqliteRowStore {
    let rows = SqliteRowStore::open(dir.path().join("graphrec.db")).unwrap();
    rows.insert_interactions(&[
        InteractionRow::new(1, 10, 100),
        InteractionRow::new(2, 10, 101),
        InteractionRow::new(2, 20, 102),
    ])
    .unwrap();
    rows.upsert_items(&[ItemMeta::new(20, "Heat", "Crime")]).unwrap();
    rows.set_preferences(1, &BTreeSet::from([4])).unwrap();
    rows
}

#[test]
fn test_missing_snapshot_rebuilds_and_saves() {
    let dir = TempDir::new().unwrap();
    let rows = seeded_rows(&dir);
    let snapshots = FileSnapshotStore::new(dir.path().join("graph.snap"));

    let (graph, report) = load_graph(&rows, &snapshots).unwrap();
    assert_eq!(report.source, BootSource::Rows);
    assert!(report.snapshot_error.is_none());
    assert!(report.snapshot_saved);
    assert_eq!(report.counts.edges, 3);
    assert_eq!(graph.genre_of(20), 4);
    assert_eq!(graph.preferences_of(1), BTreeSet::from([4]));
    assert!(snapshots.path().exists());

    let (_, report) = load_graph(&rows, &snapshots).unwrap();
    assert_eq!(report.source, BootSource::Snapshot);
}

#[test]
fn test_corrupt_snapshot_is_rejected_and_replaced() {
    let dir = TempDir::new().unwrap();
    let rows = seeded_rows(&dir);
    let path = dir.path().join("graph.snap");
    let snapshots = FileSnapshotStore::new(&path);
    load_graph(&rows, &snapshots).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let (graph, report) = load_graph(&rows, &snapshots).unwrap();
    assert_eq!(report.source, BootSource::Rows);
    assert!(report.snapshot_error.is_some());
    assert!(report.snapshot_saved);
    assert_eq!(graph.counts().edges, 3);

    let repaired = fs::read(&path).unwrap();
    assert!(snapshot::decode(&repaired).is_ok());
}

#[test]
fn test_foreign_and_future_snapshots_are_rejected() {
    let store = GraphStore::new();
    store.add_edge(1, 2, 3);
    let bytes = snapshot::encode_store(&store);
    assert_eq!(&bytes[..4], &SNAPSHOT_MAGIC);

    let mut foreign = bytes.clone();
    foreign[..4].copy_from_slice(b"JUNK");
    assert!(matches!(
        snapshot::decode(&foreign),
        Err(SnapshotError::BadMagic)
    ));

    let mut future = bytes.clone();
    future[4..6].copy_from_slice(&2u16.to_le_bytes());
    assert!(matches!(
        snapshot::decode(&future),
        Err(SnapshotError::UnsupportedVersion { found: 2 })
    ));

    let mut padded = bytes;
    padded.push(0);
    assert!(snapshot::decode(&padded).is_err());
}

#[test]
fn test_sqlite_snapshot_store_keeps_latest() {
    let dir = TempDir::new().unwrap();
    let rows = seeded_rows(&dir);
    assert!(rows.load_latest().unwrap().is_none());

    rows.save(b"first").unwrap();
    rows.save(b"second").unwrap();
    assert_eq!(rows.load_latest().unwrap().as_deref(), Some(&b"second"[..]));
}

#[test]
fn test_shutdown_persists_live_mutations() {
    let dir = TempDir::new().unwrap();
    let rows = seeded_rows(&dir);
    let snapshots = FileSnapshotStore::new(dir.path().join("graph.snap"));

    let (graph, _) = load_graph(&rows, &snapshots).unwrap();
    graph.add_edge(3, 30, 200);
    assert!(shutdown(&graph, &snapshots));

    let (reloaded, report) = load_graph(&rows, &snapshots).unwrap();
    assert_eq!(report.source, BootSource::Snapshot);
    assert_eq!(reloaded.edge_timestamp(3, 30), Some(200));
    assert_eq!(reloaded.counts(), graph.counts());
}

#[test]
fn test_unwritable_snapshot_path_still_boots() {
    let dir = TempDir::new().unwrap();
    let rows = seeded_rows(&dir);
    // A directory where the file should be makes every save fail.
    let path = dir.path().join("graph.snap");
    fs::create_dir_all(&path).unwrap();
    let snapshots = FileSnapshotStore::new(&path);

    let (graph, report) = load_graph(&rows, &snapshots).unwrap();
    assert_eq!(report.source, BootSource::Rows);
    assert!(!report.snapshot_saved);
    assert_eq!(graph.counts().edges, 3);
}
