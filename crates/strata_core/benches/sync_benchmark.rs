//! # Sync Benchmark
//!
//! Compares a full mirror upload against the bounding-range partial upload
//! for different dirty fractions.
//!
//! Target: partial sync well under full-upload cost when <5% is dirty.

#![allow(missing_docs)]

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use strata_core::{AllocationHandle, BlockAllocator, HostMirror};

const BLOCKS: usize = 65_536;
const REGION_BLOCKS: usize = 16;

fn populated() -> (BlockAllocator<[f32; 4]>, Vec<AllocationHandle<[f32; 4]>>) {
    let mut alloc = BlockAllocator::with_capacity(4, BLOCKS, HostMirror::new()).unwrap();
    let handles = (0..BLOCKS / REGION_BLOCKS)
        .map(|_| alloc.allocate(REGION_BLOCKS))
        .collect();
    alloc.synchronize();
    (alloc, handles)
}

fn bench_full_upload(c: &mut Criterion) {
    let bytes = BLOCKS * 4 * std::mem::size_of::<[f32; 4]>();

    let mut group = c.benchmark_group("sync_full");
    group.throughput(Throughput::Bytes(bytes as u64));
    group.bench_function("reallocate", |b| {
        // A fresh store has never been mirrored, so the first sync is full.
        b.iter_batched(
            || BlockAllocator::<[f32; 4]>::with_capacity(4, BLOCKS, HostMirror::new()).unwrap(),
            |mut alloc| {
                black_box(alloc.synchronize());
                alloc
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn bench_partial_upload(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_partial");

    for dirty_pct in [1usize, 5, 25] {
        let (mut alloc, handles) = populated();
        let stride = 100 / dirty_pct;

        group.bench_with_input(BenchmarkId::new("clustered", dirty_pct), &dirty_pct, |b, &pct| {
            let count = handles.len() * pct / 100;
            b.iter(|| {
                for handle in handles.iter().take(count) {
                    handle.mark_dirty();
                }
                black_box(alloc.synchronize())
            });
        });

        group.bench_with_input(BenchmarkId::new("scattered", dirty_pct), &dirty_pct, |b, _| {
            b.iter(|| {
                for handle in handles.iter().step_by(stride) {
                    handle.mark_dirty();
                }
                black_box(alloc.synchronize())
            });
        });

        let stats = alloc.sync_stats();
        println!(
            "[{dirty_pct}%] partial uploads: {}, savings: {:.1}%",
            stats.partial_uploads,
            stats.bandwidth_savings() * 100.0
        );
    }

    group.finish();
}

fn bench_clean_skip(c: &mut Criterion) {
    let (mut alloc, _handles) = populated();
    c.bench_function("sync_clean_skip", |b| b.iter(|| black_box(alloc.synchronize())));
}

criterion_group!(benches, bench_full_upload, bench_partial_upload, bench_clean_skip);
criterion_main!(benches);
