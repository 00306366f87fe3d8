//! # Region Table
//!
//! Offset-ordered partition of the backing store into free and in-use runs.
//!
//! ## Layout
//!
//! ```text
//!  block 0                                                  total_blocks
//!  ├──────────┬─────┬───────────────┬──────┬────────────────┤
//!  │ IN_USE 4 │ F 1 │   IN_USE 6    │ F 2  │     FREE 7     │
//!  └──────────┴─────┴───────────────┴──────┴────────────────┘
//! ```
//!
//! Records live in a dense `Vec` sorted by `start`. Handles refer to regions
//! by [`RegionId`]; the id index maps each live id to the region's `start`,
//! and the record is found by binary search. A region's `start` never
//! changes while it exists, so the index only needs maintenance when records
//! are created or retired.
//!
//! ## Coalescing
//!
//! Releasing a region never merges neighbours. Merging happens lazily in
//! [`RegionTable::coalesce`], which the allocator only calls once a
//! first-fit scan has failed.

use std::collections::HashMap;

/// Stable identifier of a region record. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(u64);

impl RegionId {
    /// Placeholder carried by empty handles. No live region has this id.
    pub const NONE: Self = Self(0);

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// A contiguous run of blocks sharing one status and one dirty flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    /// Identifier handed to allocation handles.
    pub id: RegionId,
    /// First block of the run.
    pub start: usize,
    /// Length of the run in blocks.
    pub count: usize,
    /// Whether a live handle owns this run.
    pub in_use: bool,
    /// Whether the run was written since the last synchronization.
    pub dirty: bool,
}

impl Region {
    fn free(id: RegionId, start: usize, count: usize) -> Self {
        Self {
            id,
            start,
            count,
            in_use: false,
            dirty: false,
        }
    }

    /// One past the last block of the run.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start + self.count
    }

    /// Whether the run is available for allocation.
    #[inline]
    #[must_use]
    pub const fn is_free(&self) -> bool {
        !self.in_use
    }
}

/// Result of one coalescing pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Coalesced {
    /// Position of the best-fitting merged region, if any satisfied the request.
    pub best: Option<usize>,
    /// Number of free streaks that were merged.
    pub merged_runs: usize,
    /// Number of records removed from the table.
    pub retired: usize,
}

/// Offset-ordered region records plus the id lookup index.
#[derive(Debug)]
pub struct RegionTable {
    regions: Vec<Region>,
    /// id -> start block
    index: HashMap<RegionId, usize>,
    next_id: u64,
}

impl Default for RegionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }

    /// Creates a table with one free region spanning `blocks`.
    #[must_use]
    pub fn with_blocks(blocks: usize) -> Self {
        let mut table = Self::new();
        if blocks > 0 {
            table.push_free(0, blocks);
        }
        table
    }

    /// Number of region records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the table has no records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Blocks covered by the table.
    #[inline]
    #[must_use]
    pub fn total_blocks(&self) -> usize {
        self.regions.last().map_or(0, Region::end)
    }

    /// Regions in offset order.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    /// Iterates regions in offset order.
    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub(crate) fn regions_mut(&mut self) -> std::slice::IterMut<'_, Region> {
        self.regions.iter_mut()
    }

    /// Last region by offset.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&Region> {
        self.regions.last()
    }

    fn allocate_id(&mut self) -> RegionId {
        let id = RegionId(self.next_id);
        self.next_id += 1;
        id
    }

    fn position(&self, id: RegionId) -> Option<usize> {
        let start = *self.index.get(&id)?;
        self.regions
            .binary_search_by_key(&start, |region| region.start)
            .ok()
    }

    /// Looks up a live region by id.
    #[must_use]
    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.position(id).map(|pos| &self.regions[pos])
    }

    /// Looks up a live region by id for mutation of its flags.
    pub(crate) fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.position(id).map(|pos| &mut self.regions[pos])
    }

    /// Whether `id` is present in the lookup index.
    #[must_use]
    pub fn contains(&self, id: RegionId) -> bool {
        self.index.contains_key(&id)
    }

    /// First free region, in offset order, with at least `blocks` blocks.
    #[must_use]
    pub fn first_fit(&self, blocks: usize) -> Option<usize> {
        self.regions
            .iter()
            .position(|region| region.is_free() && region.count >= blocks)
    }

    /// Merges every run of consecutive free regions into its first member.
    ///
    /// The best candidate is the merged region with the least slack over
    /// `blocks`; ties go to the one found first. Free regions that were not
    /// part of a multi-region streak are never candidates.
    pub fn coalesce(&mut self, blocks: usize) -> Coalesced {
        let old = std::mem::take(&mut self.regions);
        let mut merged: Vec<Region> = Vec::with_capacity(old.len());
        let mut result = Coalesced::default();
        let mut best_slack = usize::MAX;
        let mut streak = 0usize;

        let mut close_streak = |merged: &Vec<Region>, streak: usize, result: &mut Coalesced| {
            if streak <= 1 {
                return;
            }
            result.merged_runs += 1;
            let pos = merged.len() - 1;
            let head = &merged[pos];
            if head.count >= blocks {
                let slack = head.count - blocks;
                if result.best.is_none() || slack < best_slack {
                    best_slack = slack;
                    result.best = Some(pos);
                }
            }
        };

        for region in old {
            if region.in_use {
                close_streak(&merged, streak, &mut result);
                streak = 0;
                merged.push(region);
                continue;
            }

            if streak == 0 {
                merged.push(region);
            } else if let Some(head) = merged.last_mut() {
                head.count += region.count;
                self.index.remove(&region.id);
                result.retired += 1;
            }
            streak += 1;
        }
        close_streak(&merged, streak, &mut result);

        self.regions = merged;
        result
    }

    /// Carves the free suffix beyond `blocks` off the region at `pos`.
    ///
    /// Returns the id of the new free region, or `None` if the region was
    /// already exactly `blocks` long.
    pub fn split(&mut self, pos: usize, blocks: usize) -> Option<RegionId> {
        let region = &mut self.regions[pos];
        if region.count <= blocks {
            return None;
        }
        let rest = region.count - blocks;
        let start = region.start + blocks;
        region.count = blocks;

        let id = self.allocate_id();
        self.regions.insert(pos + 1, Region::free(id, start, rest));
        self.index.insert(id, start);
        Some(id)
    }

    /// Marks the free region at `pos` in use, splitting off any excess.
    ///
    /// # Panics
    ///
    /// Panics if the region is in use or shorter than `blocks`.
    pub fn claim(&mut self, pos: usize, blocks: usize) -> RegionId {
        let region = &self.regions[pos];
        assert!(
            region.is_free() && region.count >= blocks,
            "claim of region {:?} ({} blocks, in_use={}) for {blocks} blocks",
            region.id,
            region.count,
            region.in_use,
        );

        self.split(pos, blocks);
        let region = &mut self.regions[pos];
        region.in_use = true;
        region.dirty = false;
        region.id
    }

    /// Returns the region to the free state. No merging happens here.
    ///
    /// Returns `false` if `id` is unknown.
    pub fn release(&mut self, id: RegionId) -> bool {
        match self.get_mut(id) {
            Some(region) => {
                region.in_use = false;
                true
            }
            None => false,
        }
    }

    /// Appends a free region at `start`. Caller guarantees it abuts the tail.
    fn push_free(&mut self, start: usize, count: usize) -> RegionId {
        let id = self.allocate_id();
        self.regions.push(Region::free(id, start, count));
        self.index.insert(id, start);
        id
    }

    /// Accounts for `added` new blocks at the end of the store.
    ///
    /// A trailing free region absorbs them; otherwise a new free region is
    /// appended.
    pub fn extend_tail(&mut self, added: usize) {
        if added == 0 {
            return;
        }
        match self.regions.last_mut() {
            Some(last) if last.is_free() => last.count += added,
            _ => {
                let start = self.total_blocks();
                self.push_free(start, added);
            }
        }
    }

    /// Checks ordering, tiling of `[0, total_blocks)` and index consistency.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self, total_blocks: usize) -> Result<(), String> {
        let mut cursor = 0usize;
        for region in &self.regions {
            if region.count == 0 {
                return Err(format!("region {:?} is empty", region.id));
            }
            if region.start != cursor {
                return Err(format!(
                    "region {:?} starts at {} but previous run ended at {cursor}",
                    region.id, region.start
                ));
            }
            match self.index.get(&region.id) {
                Some(&start) if start == region.start => {}
                Some(&start) => {
                    return Err(format!(
                        "index maps {:?} to {start}, record starts at {}",
                        region.id, region.start
                    ))
                }
                None => return Err(format!("region {:?} missing from index", region.id)),
            }
            cursor = region.end();
        }
        if cursor != total_blocks {
            return Err(format!("regions cover {cursor} blocks, store has {total_blocks}"));
        }
        if self.index.len() != self.regions.len() {
            return Err(format!(
                "index holds {} ids for {} regions",
                self.index.len(),
                self.regions.len()
            ));
        }
        Ok(())
    }
}
