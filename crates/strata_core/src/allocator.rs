//! # Block Allocator
//!
//! First-fit allocation over the region table, with lazy coalescing and
//! doubling growth as fallbacks.
//!
//! ## Allocation Path
//!
//! ```text
//! allocate(n)
//!   │
//!   ├─ first-fit scan ──────────── hit ──┐
//!   │                                    │
//!   └─ miss: coalesce free streaks       │
//!        ├─ best-fit merged run ── hit ──┤
//!        └─ miss: grow store, use tail ──┤
//!                                        ▼
//!                              split excess, mark in use
//! ```
//!
//! ## Ownership
//!
//! The allocator and every handle it issues share one arena through `Rc`.
//! Interior mutability is split in two cells:
//!
//! ```text
//! BlockArena
//!   ├─ store: RefCell<BackingStore>   element views (data / data_mut)
//!   └─ book:  RefCell<ArenaBook>      regions, dirty flag, counters
//! ```
//!
//! Bookkeeping (`mark_dirty`, `release`, `offset`, stats) never touches the
//! store cell, so it works while element views are held. `allocate` and
//! `reserve_blocks` borrow the store mutably and panic if any view is still
//! alive; `synchronize` only reads it and panics only under a write view. Nothing here is `Send`: the allocator belongs to a
//! single owner, typically the render loop.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use bytemuck::Pod;
use tracing::{debug, trace};

use crate::config::AllocatorConfig;
use crate::error::{AllocError, AllocResult};
use crate::handle::AllocationHandle;
use crate::region::{Region, RegionId, RegionTable};
use crate::store::BackingStore;
use crate::sync::{HostMirror, RemoteMirror, SyncOutcome, SyncStats};

/// Running counters kept by the arena.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ArenaCounters {
    pub(crate) live_handles: usize,
    pub(crate) grow_events: u64,
    pub(crate) coalesce_passes: u64,
    pub(crate) regions_retired: u64,
}

/// Region table and dirty summary. Never borrowed by element views.
#[derive(Debug)]
pub(crate) struct ArenaBook {
    pub(crate) table: RegionTable,
    /// Set by any `mark_dirty`, cleared by `synchronize`.
    pub(crate) any_dirty: bool,
    /// Blocks the remote mirror holds. Never exceeds `table.total_blocks()`.
    pub(crate) remote_blocks: usize,
    pub(crate) counters: ArenaCounters,
}

/// Store and bookkeeping shared by an allocator and its handles.
#[derive(Debug)]
pub(crate) struct BlockArena<T> {
    pub(crate) store: RefCell<BackingStore<T>>,
    pub(crate) book: RefCell<ArenaBook>,
    pub(crate) elements_per_block: usize,
}

pub(crate) type SharedArena<T> = Rc<BlockArena<T>>;

impl ArenaBook {
    fn new(blocks: usize) -> Self {
        Self {
            table: RegionTable::with_blocks(blocks),
            any_dirty: false,
            remote_blocks: 0,
            counters: ArenaCounters::default(),
        }
    }

    /// Blocks in the host store. The table always tiles the whole store.
    #[inline]
    pub(crate) fn local_blocks(&self) -> usize {
        self.table.total_blocks()
    }

    /// Whether the store grew since the mirror last received a full copy.
    #[inline]
    pub(crate) fn is_mirror_stale(&self) -> bool {
        self.remote_blocks < self.local_blocks()
    }

    pub(crate) fn release(&mut self, id: RegionId) {
        let released = self.table.release(id);
        debug_assert!(released, "release of unknown region {id:?}");
        if released {
            self.counters.live_handles -= 1;
        }
    }

    pub(crate) fn mark_dirty(&mut self, id: RegionId) {
        if let Some(region) = self.table.get_mut(id) {
            region.dirty = true;
            self.any_dirty = true;
        }
    }

    /// Region owned by a live handle.
    ///
    /// In-use regions are never merged away, so a miss is a bookkeeping bug.
    pub(crate) fn live_region(&self, id: RegionId) -> Region {
        match self.table.get(id) {
            Some(region) => *region,
            None => panic!("live handle refers to retired region {id:?}"),
        }
    }

    fn allocate_region<T: Pod>(
        &mut self,
        store: &mut BackingStore<T>,
        blocks: usize,
    ) -> AllocResult<RegionId> {
        assert!(blocks > 0, "allocate: block count must be greater than zero");

        let pos = match self.table.first_fit(blocks) {
            Some(pos) => pos,
            None => self.compact_or_expand(store, blocks)?,
        };
        let id = self.table.claim(pos, blocks);
        self.counters.live_handles += 1;
        trace!(region = id.raw(), blocks, "region claimed");
        Ok(id)
    }

    /// Second pass of `allocate`: merge free streaks, grow if that is not
    /// enough. Returns the position of a free region with room for `blocks`.
    fn compact_or_expand<T: Pod>(
        &mut self,
        store: &mut BackingStore<T>,
        blocks: usize,
    ) -> AllocResult<usize> {
        let coalesced = self.table.coalesce(blocks);
        self.counters.coalesce_passes += 1;
        self.counters.regions_retired += coalesced.retired as u64;
        if coalesced.merged_runs > 0 {
            debug!(
                merged_runs = coalesced.merged_runs,
                retired = coalesced.retired,
                regions = self.table.len(),
                "coalesced free regions"
            );
        }
        if let Some(pos) = coalesced.best {
            return Ok(pos);
        }

        let needed = match self.table.last() {
            Some(last) if last.is_free() => blocks.saturating_sub(last.count),
            _ => blocks,
        };
        self.grow_by(store, needed)?;
        Ok(self.table.len() - 1)
    }

    fn grow_by<T: Pod>(&mut self, store: &mut BackingStore<T>, min_extra: usize) -> AllocResult<()> {
        let current = store.local_blocks();
        let target = current
            .checked_add(min_extra)
            .ok_or(AllocError::CapacityOverflow {
                blocks: current,
                elements_per_block: store.elements_per_block(),
            })?;
        self.reserve(store, target)
    }

    /// Doubles the store until it holds at least `min_blocks`.
    fn reserve<T: Pod>(&mut self, store: &mut BackingStore<T>, min_blocks: usize) -> AllocResult<()> {
        let current = store.local_blocks();
        if min_blocks <= current {
            return Ok(());
        }

        let mut target = current.max(1);
        while target < min_blocks {
            target = target.checked_mul(2).ok_or(AllocError::CapacityOverflow {
                blocks: target,
                elements_per_block: store.elements_per_block(),
            })?;
        }

        store.grow_to(target)?;
        self.table.extend_tail(target - current);
        self.counters.grow_events += 1;
        debug!(from_blocks = current, to_blocks = target, "backing store grown");
        Ok(())
    }

    fn validate(&self, store_blocks: usize) -> AllocResult<()> {
        let corrupted = |reason: String| AllocError::Corrupted { reason };

        self.table.validate(store_blocks).map_err(corrupted)?;
        if self.remote_blocks > store_blocks {
            return Err(corrupted(format!(
                "mirror holds {} blocks, store only {store_blocks}",
                self.remote_blocks
            )));
        }
        let in_use = self.table.iter().filter(|r| r.in_use).count();
        if in_use != self.counters.live_handles {
            return Err(corrupted(format!(
                "{in_use} regions in use but {} live handles",
                self.counters.live_handles
            )));
        }
        Ok(())
    }
}

impl<T> BlockArena<T> {
    /// Shared store access for reading the whole array.
    ///
    /// # Panics
    ///
    /// Panics if a write view is still held.
    pub(crate) fn store_ref(&self, operation: &str) -> Ref<'_, BackingStore<T>> {
        match self.store.try_borrow() {
            Ok(store) => store,
            Err(_) => panic!("{operation} while a write view is held"),
        }
    }

    /// Mutable store access for operations that may move or read the whole
    /// array.
    ///
    /// # Panics
    ///
    /// Panics if an element view is still held.
    pub(crate) fn store_mut(&self, operation: &str) -> RefMut<'_, BackingStore<T>> {
        match self.store.try_borrow_mut() {
            Ok(store) => store,
            Err(_) => panic!("{operation} while an element view is held"),
        }
    }
}

impl<T: Pod> BlockArena<T> {
    fn new(elements_per_block: usize, initial_blocks: usize) -> AllocResult<Self> {
        Ok(Self::from_parts(
            BackingStore::new(elements_per_block, initial_blocks)?,
            ArenaBook::new(initial_blocks),
        ))
    }

    fn from_parts(store: BackingStore<T>, book: ArenaBook) -> Self {
        Self {
            elements_per_block: store.elements_per_block(),
            store: RefCell::new(store),
            book: RefCell::new(book),
        }
    }

    fn allocate_region(&self, blocks: usize) -> AllocResult<RegionId> {
        let mut store = self.store_mut("allocate");
        self.book.borrow_mut().allocate_region(&mut *store, blocks)
    }

    fn reserve(&self, min_blocks: usize) -> AllocResult<()> {
        let mut store = self.store_mut("reserve_blocks");
        self.book.borrow_mut().reserve(&mut *store, min_blocks)
    }

    fn validate(&self) -> AllocResult<()> {
        let book = self.book.borrow();
        let store_blocks = match self.store.try_borrow() {
            Ok(store) => store.local_blocks(),
            Err(_) => book.local_blocks(),
        };
        book.validate(store_blocks)
    }
}

/// Snapshot of allocator occupancy and lifetime counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Blocks in the host store.
    pub local_blocks: usize,
    /// Blocks held by the remote mirror.
    pub remote_blocks: usize,
    /// Allocation granularity.
    pub elements_per_block: usize,
    /// Region records in the table.
    pub region_count: usize,
    /// Blocks owned by live handles.
    pub used_blocks: usize,
    /// Blocks not owned by any handle.
    pub free_blocks: usize,
    /// Longest single free region (without coalescing).
    pub largest_free_run: usize,
    /// Handles currently alive.
    pub live_handles: usize,
    /// Times the store grew.
    pub grow_events: u64,
    /// Times the coalescing pass ran.
    pub coalesce_passes: u64,
    /// Region records removed by coalescing.
    pub regions_retired: u64,
}

impl AllocatorStats {
    /// Share of free space outside the largest free region (0.0 to 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fragmentation(&self) -> f32 {
        if self.free_blocks == 0 {
            0.0
        } else {
            1.0 - (self.largest_free_run as f32 / self.free_blocks as f32)
        }
    }
}

/// Growable block sub-allocator mirrored to a remote buffer.
///
/// # Example
///
/// ```rust
/// use strata_core::{BlockAllocator, HostMirror};
///
/// let mut allocator = BlockAllocator::<u32>::new(4, HostMirror::new());
/// let handle = allocator.allocate(2);
/// handle.write(&[1, 2, 3, 4]);
/// allocator.synchronize();
/// assert_eq!(allocator.remote_blocks(), allocator.local_blocks());
/// ```
pub struct BlockAllocator<T, M = HostMirror> {
    arena: SharedArena<T>,
    mirror: M,
    sync_stats: SyncStats,
    label: String,
}

impl<T: Pod, M: RemoteMirror> BlockAllocator<T, M> {
    /// Creates an allocator with an empty store.
    ///
    /// # Panics
    ///
    /// Panics if `elements_per_block` is zero.
    #[must_use]
    pub fn new(elements_per_block: usize, mirror: M) -> Self {
        assert!(elements_per_block > 0, "elements_per_block must be greater than zero");
        let arena = BlockArena::from_parts(BackingStore::empty(elements_per_block), ArenaBook::new(0));
        Self::from_arena(arena, mirror, "strata".to_owned())
    }

    /// Creates an allocator with `initial_blocks` free blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial store cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if `elements_per_block` is zero.
    pub fn with_capacity(
        elements_per_block: usize,
        initial_blocks: usize,
        mirror: M,
    ) -> AllocResult<Self> {
        let arena = BlockArena::new(elements_per_block, initial_blocks)?;
        Ok(Self::from_arena(arena, mirror, "strata".to_owned()))
    }

    /// Creates an allocator from a validated config.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial store cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if the config has a zero granularity.
    pub fn from_config(config: &AllocatorConfig, mirror: M) -> AllocResult<Self> {
        let arena = BlockArena::new(config.elements_per_block, config.initial_blocks)?;
        Ok(Self::from_arena(arena, mirror, config.label.clone()))
    }

    fn from_arena(arena: BlockArena<T>, mirror: M, label: String) -> Self {
        Self {
            arena: Rc::new(arena),
            mirror,
            sync_stats: SyncStats::default(),
            label,
        }
    }

    /// Allocates `blocks` contiguous blocks.
    ///
    /// May grow the store, which relocates the backing array. No element
    /// view obtained from a handle may be held across this call.
    ///
    /// # Panics
    ///
    /// Panics if `blocks` is zero, if an element view is still borrowed, or
    /// if the host cannot supply memory for growth.
    pub fn allocate(&mut self, blocks: usize) -> AllocationHandle<T> {
        match self.try_allocate(blocks) {
            Ok(handle) => handle,
            Err(err) => panic!("{}: allocation of {blocks} blocks failed: {err}", self.label),
        }
    }

    /// Allocates `blocks` contiguous blocks, reporting growth failure.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfMemory`] or [`AllocError::CapacityOverflow`]
    /// when growth is needed and impossible. The table is left consistent.
    ///
    /// # Panics
    ///
    /// Panics if `blocks` is zero or an element view is still borrowed.
    pub fn try_allocate(&mut self, blocks: usize) -> AllocResult<AllocationHandle<T>> {
        let id = self.arena.allocate_region(blocks)?;
        Ok(AllocationHandle::new(
            Rc::clone(&self.arena),
            self.arena.elements_per_block,
            blocks,
            id,
        ))
    }

    /// Grows the store to hold at least `blocks` blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot supply the memory.
    pub fn reserve_blocks(&mut self, blocks: usize) -> AllocResult<()> {
        self.arena.reserve(blocks)
    }

    /// Pushes pending changes to the mirror.
    ///
    /// After growth the whole store is sent; otherwise only the bounding
    /// range of dirty in-use regions.
    pub fn synchronize(&mut self) -> SyncOutcome {
        let store = self.arena.store_ref("synchronize");
        let outcome = self.arena.book.borrow_mut().synchronize(&*store, &mut self.mirror);
        self.sync_stats
            .record(outcome, store.local_blocks() * store.bytes_per_block());
        outcome
    }

    /// Checks every bookkeeping invariant.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Corrupted`] describing the first violation.
    pub fn validate(&self) -> AllocResult<()> {
        self.arena.validate()
    }
}

impl<T, M> BlockAllocator<T, M> {
    /// Name used in log output.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Blocks in the host store.
    #[must_use]
    pub fn local_blocks(&self) -> usize {
        self.arena.book.borrow().local_blocks()
    }

    /// Blocks held by the mirror.
    #[must_use]
    pub fn remote_blocks(&self) -> usize {
        self.arena.book.borrow().remote_blocks
    }

    /// Allocation granularity.
    #[must_use]
    pub fn elements_per_block(&self) -> usize {
        self.arena.elements_per_block
    }

    /// Whether any region was marked dirty since the last sync.
    #[must_use]
    pub fn any_dirty(&self) -> bool {
        self.arena.book.borrow().any_dirty
    }

    /// Copy of the region table in offset order.
    #[must_use]
    pub fn regions(&self) -> Vec<Region> {
        self.arena.book.borrow().table.as_slice().to_vec()
    }

    /// Occupancy snapshot.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        let book = self.arena.book.borrow();
        let mut stats = AllocatorStats {
            local_blocks: book.local_blocks(),
            remote_blocks: book.remote_blocks,
            elements_per_block: self.arena.elements_per_block,
            region_count: book.table.len(),
            live_handles: book.counters.live_handles,
            grow_events: book.counters.grow_events,
            coalesce_passes: book.counters.coalesce_passes,
            regions_retired: book.counters.regions_retired,
            ..AllocatorStats::default()
        };
        for region in book.table.iter() {
            if region.in_use {
                stats.used_blocks += region.count;
            } else {
                stats.free_blocks += region.count;
                stats.largest_free_run = stats.largest_free_run.max(region.count);
            }
        }
        stats
    }

    /// Lifetime synchronization counters.
    #[must_use]
    pub fn sync_stats(&self) -> SyncStats {
        self.sync_stats
    }

    /// The remote mirror.
    #[must_use]
    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    /// The remote mirror, mutably.
    pub fn mirror_mut(&mut self) -> &mut M {
        &mut self.mirror
    }
}
