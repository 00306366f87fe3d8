//! # Allocator Invariant Tests
//!
//! Drives random allocate / release / write / synchronize sequences and
//! checks the bookkeeping after every step:
//!
//! 1. Regions tile `[0, local_blocks)` with no gaps or overlaps
//! 2. In-use blocks equal the blocks held by live handles
//! 3. The store never shrinks and the mirror never runs ahead of it
//! 4. After a sync the mirror bytes equal the store bytes for live data
//!
//! Run with: cargo test -p strata_core --test allocator_invariants

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use strata_core::{AllocationHandle, BlockAllocator, HostMirror, SyncOutcome};

fn check_tiling(alloc: &BlockAllocator<u32>) {
    let regions = alloc.regions();
    let mut cursor = 0;
    for region in &regions {
        assert_eq!(region.start, cursor, "gap or overlap at block {cursor}");
        assert!(region.count > 0);
        cursor += region.count;
    }
    assert_eq!(cursor, alloc.local_blocks());
}

fn live_blocks(handles: &[(AllocationHandle<u32>, bool)]) -> usize {
    handles.iter().map(|(handle, _)| handle.block_count()).sum()
}

fn run_sequence(seed: u64, steps: usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut alloc = BlockAllocator::<u32>::with_capacity(2, 16, HostMirror::new()).unwrap();
    // (handle, written since allocation)
    let mut handles: Vec<(AllocationHandle<u32>, bool)> = Vec::new();
    let mut last_local = alloc.local_blocks();
    let mut stamp = 1u32;

    for _ in 0..steps {
        match rng.gen_range(0..10) {
            0..=3 => {
                let blocks = rng.gen_range(1..=12);
                handles.push((alloc.allocate(blocks), false));
            }
            4..=6 if !handles.is_empty() => {
                let victim = rng.gen_range(0..handles.len());
                handles.swap_remove(victim);
            }
            7..=8 if !handles.is_empty() => {
                let pick = rng.gen_range(0..handles.len());
                let (target, written) = &mut handles[pick];
                let values = vec![stamp; target.element_count()];
                target.write(&values);
                *written = true;
                stamp += 1;
            }
            _ => {
                alloc.synchronize();
                assert_eq!(alloc.remote_blocks(), alloc.local_blocks());
                assert!(!alloc.any_dirty());
                assert_eq!(alloc.mirror().bytes().len(), alloc.local_blocks() * 2 * 4);
                for (handle, _) in handles.iter().filter(|(_, written)| *written) {
                    let offset = handle.offset() * 4;
                    let data = handle.data();
                    let expected: &[u8] = bytemuck::cast_slice(&*data);
                    assert_eq!(&alloc.mirror().bytes()[offset..offset + expected.len()], expected);
                }
            }
        }

        check_tiling(&alloc);
        let stats = alloc.stats();
        assert_eq!(stats.used_blocks, live_blocks(&handles));
        assert_eq!(stats.live_handles, handles.len());
        assert!(alloc.local_blocks() >= last_local, "store shrank");
        assert!(alloc.remote_blocks() <= alloc.local_blocks());
        last_local = alloc.local_blocks();
        alloc.validate().unwrap();
    }
}

#[test]
fn invariants_hold_under_random_churn() {
    for seed in 0..16 {
        run_sequence(seed, 400);
    }
}

#[test]
fn release_then_same_size_reuses_region() {
    let mut alloc = BlockAllocator::<u32>::with_capacity(4, 32, HostMirror::new()).unwrap();
    let _a = alloc.allocate(5);
    let b = alloc.allocate(7);
    let _c = alloc.allocate(3);
    let b_offset = b.offset();
    drop(b);

    let again = alloc.allocate(7);
    assert_eq!(again.offset(), b_offset);
    assert_eq!(alloc.local_blocks(), 32);
    assert_eq!(alloc.stats().grow_events, 0);
}

#[test]
fn two_halves_coalesce_into_whole() {
    let mut alloc = BlockAllocator::<u32>::with_capacity(1, 8, HostMirror::new()).unwrap();
    let a = alloc.allocate(4);
    let b = alloc.allocate(4);
    drop(a);
    drop(b);

    let whole = alloc.allocate(8);
    assert_eq!(whole.offset(), 0);
    assert_eq!(alloc.local_blocks(), 8);
}

#[test]
fn coalescing_prefers_tightest_merged_run() {
    // [F3 F3][U1][F2 F2][U1]
    let mut alloc = BlockAllocator::<u32>::with_capacity(1, 12, HostMirror::new()).unwrap();
    let handles: Vec<_> = [3, 3, 1, 2, 2, 1].iter().map(|&n| alloc.allocate(n)).collect();
    let _kept: Vec<_> = handles
        .into_iter()
        .enumerate()
        .filter_map(|(i, handle)| (i == 2 || i == 5).then_some(handle))
        .collect();

    // Merged runs are 6 blocks at 0 and 4 blocks at 7.
    let got = alloc.allocate(4);
    assert_eq!(got.offset(), 7);
    assert_eq!(alloc.local_blocks(), 12);
    assert_eq!(alloc.regions().len(), 4);
}

#[test]
fn growth_extends_tail_left_by_coalescing() {
    // [U2][F2][F2]: the tail streak merges to 4 blocks, one short of 5.
    let mut alloc = BlockAllocator::<u32>::with_capacity(1, 6, HostMirror::new()).unwrap();
    let _kept = alloc.allocate(2);
    let b = alloc.allocate(2);
    let c = alloc.allocate(2);
    drop(b);
    drop(c);

    let big = alloc.allocate(5);
    assert_eq!(alloc.local_blocks(), 12);
    assert_eq!(big.offset(), 2);
    let tail = alloc.regions().last().copied().unwrap();
    assert_eq!((tail.start, tail.count, tail.in_use), (7, 5, false));
    assert_eq!(alloc.stats().grow_events, 1);
    alloc.validate().unwrap();
}

#[test]
fn growth_is_followed_by_full_upload() {
    let mut alloc = BlockAllocator::<u32>::with_capacity(3, 4, HostMirror::new()).unwrap();
    alloc.synchronize();
    let _first = alloc.allocate(4);
    let second = alloc.allocate(4);
    second.mark_dirty();
    assert!(alloc.local_blocks() > alloc.remote_blocks());

    assert!(matches!(alloc.synchronize(), SyncOutcome::Full { blocks: 8, .. }));
    assert_eq!(alloc.remote_blocks(), 8);
    assert!(alloc.regions().iter().all(|r| !r.dirty));
}

#[test]
fn hundred_block_store_uploads_thirty_to_forty_five() {
    let mut alloc = BlockAllocator::<u32>::with_capacity(3, 100, HostMirror::new()).unwrap();
    alloc.synchronize();
    alloc.mirror_mut().clear_log();

    let _before = alloc.allocate(10);
    let target = alloc.allocate(5);
    target.mark_dirty();

    let outcome = alloc.synchronize();
    let transfer = alloc.mirror().last_transfer().unwrap();
    assert_eq!(transfer.byte_offset / 4, 30);
    assert_eq!(transfer.byte_len / 4, 15);
    assert_eq!(outcome.bytes(), 60);
}
