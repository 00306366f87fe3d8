//! # Backing Store
//!
//! Host-side element array, sized in whole blocks.

use std::ops::Range;

use bytemuck::Pod;

use crate::error::{AllocError, AllocResult};

/// Growable host copy of the buffer contents.
#[derive(Debug)]
pub struct BackingStore<T> {
    elements: Vec<T>,
    elements_per_block: usize,
}

impl<T: Pod> BackingStore<T> {
    /// Creates a store holding `blocks` zeroed blocks.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::CapacityOverflow`] or [`AllocError::OutOfMemory`]
    /// if the initial size cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if `elements_per_block` is zero.
    pub fn new(elements_per_block: usize, blocks: usize) -> AllocResult<Self> {
        let mut store = Self::empty(elements_per_block);
        store.grow_to(blocks)?;
        Ok(store)
    }

    /// Resizes the store to `blocks`. Existing content is preserved and new
    /// elements are zeroed. Never shrinks.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::CapacityOverflow`] when the element count does
    /// not fit in `usize`, [`AllocError::OutOfMemory`] when the host refuses
    /// the reservation.
    pub fn grow_to(&mut self, blocks: usize) -> AllocResult<()> {
        let new_len = blocks
            .checked_mul(self.elements_per_block)
            .ok_or(AllocError::CapacityOverflow {
                blocks,
                elements_per_block: self.elements_per_block,
            })?;
        if new_len <= self.elements.len() {
            return Ok(());
        }

        self.elements
            .try_reserve_exact(new_len - self.elements.len())
            .map_err(|_| AllocError::OutOfMemory {
                requested_blocks: blocks,
            })?;
        self.elements.resize(new_len, T::zeroed());
        Ok(())
    }

    /// Element range covered by `count` blocks starting at block `start`.
    #[inline]
    #[must_use]
    pub fn block_range(&self, start: usize, count: usize) -> Range<usize> {
        start * self.elements_per_block..(start + count) * self.elements_per_block
    }

    /// Elements of a block run.
    #[inline]
    #[must_use]
    pub fn blocks(&self, start: usize, count: usize) -> &[T] {
        &self.elements[self.block_range(start, count)]
    }

    /// Mutable elements of a block run.
    #[inline]
    pub fn blocks_mut(&mut self, start: usize, count: usize) -> &mut [T] {
        let range = self.block_range(start, count);
        &mut self.elements[range]
    }

    /// Copies `count` blocks starting at block `src` to block `dest`.
    #[inline]
    pub fn copy_blocks(&mut self, src: usize, count: usize, dest: usize) {
        let range = self.block_range(src, count);
        self.elements
            .copy_within(range, dest * self.elements_per_block);
    }

    /// Raw bytes of a block run.
    #[inline]
    #[must_use]
    pub fn block_bytes(&self, start: usize, count: usize) -> &[u8] {
        bytemuck::cast_slice(self.blocks(start, count))
    }

    /// Whole store as bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.elements)
    }
}

impl<T> BackingStore<T> {
    /// Creates a store with no blocks.
    ///
    /// # Panics
    ///
    /// Panics if `elements_per_block` is zero.
    #[must_use]
    pub fn empty(elements_per_block: usize) -> Self {
        assert!(elements_per_block > 0, "elements_per_block must be greater than zero");
        Self {
            elements: Vec::new(),
            elements_per_block,
        }
    }

    /// Whole store as elements.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }

    /// Blocks held locally.
    #[inline]
    #[must_use]
    pub fn local_blocks(&self) -> usize {
        self.elements.len() / self.elements_per_block
    }

    /// Allocation granularity.
    #[inline]
    #[must_use]
    pub const fn elements_per_block(&self) -> usize {
        self.elements_per_block
    }

    /// Bytes per block.
    #[inline]
    #[must_use]
    pub const fn bytes_per_block(&self) -> usize {
        self.elements_per_block * std::mem::size_of::<T>()
    }
}
