//! # Allocation Handles
//!
//! A handle owns one region for as long as it lives. Dropping it (or calling
//! [`AllocationHandle::release`]) returns the region to the free state.
//!
//! Writes through [`AllocationHandle::data_mut`] are invisible to the
//! allocator. Call [`AllocationHandle::mark_dirty`] afterwards, or use
//! [`AllocationHandle::write`], which does both.
//!
//! ## Views
//!
//! Element views borrow the shared store. Any number of read views may be
//! alive at once, or one write view. Handle bookkeeping (`offset`,
//! `mark_dirty`, drop) works regardless. Copy between two handles with
//! [`AllocationHandle::copy_from`], since a read view and a write view of the
//! same store cannot coexist.

use std::cell::{Ref, RefMut};
use std::fmt;
use std::rc::Rc;

use bytemuck::Pod;

use crate::allocator::SharedArena;
use crate::region::{Region, RegionId};

/// Scoped ownership of one block region.
///
/// A default-constructed handle is empty and owns nothing.
pub struct AllocationHandle<T> {
    arena: Option<SharedArena<T>>,
    elements_per_block: usize,
    block_count: usize,
    region_id: RegionId,
}

impl<T> Default for AllocationHandle<T> {
    fn default() -> Self {
        Self {
            arena: None,
            elements_per_block: 0,
            block_count: 0,
            region_id: RegionId::NONE,
        }
    }
}

impl<T> fmt::Debug for AllocationHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationHandle")
            .field("region_id", &self.region_id)
            .field("block_count", &self.block_count)
            .field("elements_per_block", &self.elements_per_block)
            .field("empty", &self.is_empty())
            .finish()
    }
}

impl<T> AllocationHandle<T> {
    pub(crate) fn new(
        arena: SharedArena<T>,
        elements_per_block: usize,
        block_count: usize,
        region_id: RegionId,
    ) -> Self {
        Self {
            arena: Some(arena),
            elements_per_block,
            block_count,
            region_id,
        }
    }

    /// Whether the handle owns nothing.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.arena.is_none()
    }

    /// Blocks owned. Zero for an empty handle.
    #[inline]
    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.block_count
    }

    /// Elements owned. Zero for an empty handle.
    #[inline]
    #[must_use]
    pub const fn element_count(&self) -> usize {
        self.block_count * self.elements_per_block
    }

    /// Id of the owned region, `None` for an empty handle.
    #[inline]
    #[must_use]
    pub fn region_id(&self) -> Option<RegionId> {
        self.arena.as_ref().map(|_| self.region_id)
    }

    fn arena(&self) -> &SharedArena<T> {
        match &self.arena {
            Some(arena) => arena,
            None => panic!("operation on an empty allocation handle"),
        }
    }

    fn region(&self) -> Region {
        self.arena().book.borrow().live_region(self.region_id)
    }

    /// First element of the region within the store.
    ///
    /// # Panics
    ///
    /// Panics on an empty handle.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.region().start * self.elements_per_block
    }

    /// Flags the region for upload on the next `synchronize`.
    ///
    /// # Panics
    ///
    /// Panics on an empty handle.
    pub fn mark_dirty(&self) {
        self.arena().book.borrow_mut().mark_dirty(self.region_id);
    }

    /// Gives the region back to the allocator and empties the handle.
    /// Does nothing on an empty handle.
    pub fn release(&mut self) {
        if let Some(arena) = self.arena.take() {
            arena.book.borrow_mut().release(self.region_id);
            self.block_count = 0;
            self.region_id = RegionId::NONE;
        }
    }

    /// Moves ownership out, leaving this handle empty.
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl<T: Pod> AllocationHandle<T> {
    /// Read view of the region's elements.
    ///
    /// The view must be dropped before the next `allocate` on the owning
    /// allocator, since growth may move the store.
    ///
    /// # Panics
    ///
    /// Panics on an empty handle or while a write view is held.
    #[must_use]
    pub fn data(&self) -> Ref<'_, [T]> {
        let region = self.region();
        let store = match self.arena().store.try_borrow() {
            Ok(store) => store,
            Err(_) => panic!("data() while a write view is held"),
        };
        Ref::map(store, |store| store.blocks(region.start, region.count))
    }

    /// Write view of the region's elements. Does not mark the region dirty.
    ///
    /// # Panics
    ///
    /// Panics on an empty handle or while any other view is held.
    #[must_use]
    pub fn data_mut(&self) -> RefMut<'_, [T]> {
        let region = self.region();
        RefMut::map(self.arena().store_mut("data_mut()"), |store| {
            store.blocks_mut(region.start, region.count)
        })
    }

    /// Copies `source` to the start of the region and marks it dirty.
    ///
    /// # Panics
    ///
    /// Panics on an empty handle or if `source` is longer than the region.
    pub fn write(&self, source: &[T]) {
        self.write_at(0, source);
    }

    /// Copies `source` to `element_offset` within the region and marks it
    /// dirty.
    ///
    /// # Panics
    ///
    /// Panics on an empty handle or if the write runs past the region.
    pub fn write_at(&self, element_offset: usize, source: &[T]) {
        let end = element_offset
            .checked_add(source.len())
            .filter(|&end| end <= self.element_count());
        let Some(end) = end else {
            panic!(
                "write of {} elements at {element_offset} overruns region of {} elements",
                source.len(),
                self.element_count()
            );
        };

        let region = self.region();
        let mut store = self.arena().store_mut("write()");
        store.blocks_mut(region.start, region.count)[element_offset..end].copy_from_slice(source);
        drop(store);
        self.mark_dirty();
    }

    /// Copies every element of `source` to the start of this region and
    /// marks it dirty.
    ///
    /// # Panics
    ///
    /// Panics if either handle is empty, if they belong to different
    /// allocators, if `source` is larger than this region, or while any view
    /// is held.
    pub fn copy_from(&self, source: &Self) {
        assert!(
            Rc::ptr_eq(self.arena(), source.arena()),
            "copy between handles of different allocators"
        );
        assert!(
            source.block_count <= self.block_count,
            "copy of {} blocks overruns region of {} blocks",
            source.block_count,
            self.block_count
        );

        let from = source.region();
        let to = self.region();
        self.arena()
            .store_mut("copy_from()")
            .copy_blocks(from.start, from.count, to.start);
        self.mark_dirty();
    }
}

impl<T> Drop for AllocationHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}
