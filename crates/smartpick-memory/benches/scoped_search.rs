#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Scoped exact search benchmarks.
//!
//! Measures the cost of building a transient flat index over a scope and
//! querying it, for scope sizes typical of stage-1 survivors.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use smartpick_memory::{PersistentVectorStore, Selector, StagingBatch, VectorRecord};

const DIMENSION: usize = 256;
const ROWS: usize = 5_000;

/// Deterministic pseudo-random unit vector for row `i`.
fn vector_for(i: usize) -> Vec<f32> {
    let mut state = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut v: Vec<f32> = (0..DIMENSION)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 40) as f32 / (1u64 << 24) as f32) - 0.5
        })
        .collect();
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm;
    }
    v
}

fn seeded_store(dir: &TempDir) -> PersistentVectorStore {
    let mut store = PersistentVectorStore::open(dir.path().join("bench.jsonl"), DIMENSION).unwrap();
    let mut batch = StagingBatch::new(DIMENSION);
    batch
        .extend((0..ROWS).map(|i| VectorRecord::new(vector_for(i), format!("doc-{i}"), 0, "text")))
        .unwrap();
    store.flush(batch).unwrap();
    store
}

fn bench_scoped_search(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let query = vector_for(ROWS + 1);

    let mut group = c.benchmark_group("scoped_search");
    for scope_size in [10usize, 50, 500, ROWS] {
        let metadata: Vec<String> = (0..scope_size).map(|i| format!("doc-{i}")).collect();
        let pages = vec![0i64; scope_size];
        let handle = store
            .scope(Selector::Pairs {
                metadata: &metadata,
                pages: &pages,
            })
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(scope_size), &handle, |b, handle| {
            b.iter(|| store.search(black_box(handle), black_box(&query), 5).unwrap())
        });
    }
    group.finish();
}

fn bench_scope_selection(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let metadata: Vec<String> = (0..50).map(|i| format!("doc-{}", i * 97)).collect();
    let pages = vec![0i64; metadata.len()];

    c.bench_function("scope_50_of_5000", |b| {
        b.iter(|| {
            store
                .scope(Selector::Pairs {
                    metadata: black_box(&metadata),
                    pages: &pages,
                })
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_scoped_search, bench_scope_selection);
criterion_main!(benches);
