//! Benchmarks for the ranking algorithms.
//!
//! Benchmark targets on a synthetic graph (10k users, 2k items, ~200k edges):
//! - BFS for a typical user: <5ms
//! - PPR with 10,000 walks at depth 2: <10ms
//! - Snapshot encode + decode: <100ms

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use graphrec::graph::{GraphStore, snapshot};
use graphrec::rank::{self, BfsParams, PprParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::hint::black_box;

// ============================================================================
// Helper Functions
// ============================================================================

/// Builds a graph with skewed item popularity.
fn synthetic_graph(users: u64, items: u64, likes_per_user: usize) -> GraphStore {
    let store = GraphStore::new();
    let mut rng = StdRng::seed_from_u64(42);
    for user in 0..users {
        for _ in 0..likes_per_user {
            // Squaring a uniform sample favors low item ids.
            let x: f64 = rng.r#gen();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            let item = ((x * x) * items as f64) as u64;
            store.add_edge(user, item, user);
        }
    }
    for item in 0..items {
        #[allow(clippy::cast_possible_truncation)]
        store.set_item_genre(item, (item % 8) as u32);
    }
    store
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_bfs(c: &mut Criterion) {
    let mut group = c.benchmark_group("bfs");
    for users in [1_000u64, 10_000] {
        let store = synthetic_graph(users, 2_000, 20);
        let prefs = BTreeSet::from([1, 6]);
        group.bench_with_input(BenchmarkId::new("recommend", users), &store, |b, store| {
            b.iter(|| {
                let state = store.read();
                black_box(rank::bfs::recommend(
                    &state,
                    black_box(7),
                    10,
                    Some(&prefs),
                    BfsParams::default(),
                ))
            });
        });
    }
    group.finish();
}

fn bench_ppr(c: &mut Criterion) {
    let mut group = c.benchmark_group("ppr");
    let store = synthetic_graph(10_000, 2_000, 20);
    for walks in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("walks", walks), &walks, |b, &walks| {
            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                let state = store.read();
                black_box(rank::ppr::recommend(
                    &state,
                    black_box(7),
                    10,
                    PprParams::new(walks, 2),
                    &mut rng,
                ))
            });
        });
    }
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let store = synthetic_graph(10_000, 2_000, 20);
    let bytes = snapshot::encode_store(&store);

    c.bench_function("snapshot_encode", |b| {
        b.iter(|| black_box(snapshot::encode_store(&store)));
    });
    c.bench_function("snapshot_decode", |b| {
        b.iter(|| black_box(snapshot::decode(&bytes).unwrap()));
    });
}

criterion_group!(benches, bench_bfs, bench_ppr, bench_snapshot);
criterion_main!(benches);
