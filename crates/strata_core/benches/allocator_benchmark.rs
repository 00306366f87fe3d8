//! # Allocator Benchmark
//!
//! Measures:
//! 1. First-fit allocate/release churn on a pre-sized store
//! 2. Coalescing cost when fragmented free space must be merged
//! 3. Growth from an empty store (amortized doubling)

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strata_core::{AllocationHandle, BlockAllocator, HostMirror};

/// Steady-state churn: release one handle, allocate a new one.
fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator_churn");

    for live in [64usize, 512, 4096] {
        let mut alloc =
            BlockAllocator::<[f32; 4]>::with_capacity(4, live * 16, HostMirror::new()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut handles: Vec<AllocationHandle<[f32; 4]>> =
            (0..live).map(|_| alloc.allocate(rng.gen_range(1..=8))).collect();

        group.bench_with_input(BenchmarkId::new("release_allocate", live), &live, |b, _| {
            b.iter(|| {
                let victim = rng.gen_range(0..handles.len());
                handles.swap_remove(victim);
                handles.push(alloc.allocate(black_box(rng.gen_range(1..=8))));
            });
        });
    }

    group.finish();
}

/// Worst case for the second pass: every other region free, request larger
/// than any single free region.
fn bench_coalesce(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator_coalesce");

    for regions in [256usize, 2048] {
        group.bench_with_input(BenchmarkId::new("merge_pairs", regions), &regions, |b, &n| {
            b.iter_batched(
                || {
                    let mut alloc =
                        BlockAllocator::<u32>::with_capacity(1, n * 2, HostMirror::new()).unwrap();
                    let handles: Vec<_> = (0..n * 2).map(|_| alloc.allocate(1)).collect();
                    // Free pairs, keep every third block pinned.
                    let pinned: Vec<_> = handles
                        .into_iter()
                        .enumerate()
                        .filter_map(|(i, h)| (i % 3 == 2).then_some(h))
                        .collect();
                    (alloc, pinned)
                },
                |(mut alloc, pinned)| {
                    let merged = alloc.allocate(black_box(2));
                    (alloc, pinned, merged)
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_growth(c: &mut Criterion) {
    c.bench_function("allocator_grow_from_empty_1024", |b| {
        b.iter(|| {
            let mut alloc = BlockAllocator::<u32>::new(4, HostMirror::new());
            let handles: Vec<_> = (0..1024).map(|_| alloc.allocate(black_box(1))).collect();
            handles.len()
        });
    });
}

criterion_group!(benches, bench_churn, bench_coalesce, bench_growth);
criterion_main!(benches);
