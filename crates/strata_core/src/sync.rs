//! # Mirror Synchronization
//!
//! Pushes host changes to the remote (device-side) copy of the store.
//!
//! ## The Two Paths
//!
//! ```text
//! remote_blocks < local_blocks ──► FULL:    reallocate(whole store)
//! nothing marked dirty ──────────► SKIPPED: no scan, no transfer
//! otherwise ─────────────────────► PARTIAL: replace([left, right))
//!
//!   blocks:  0    4    8    12   16   20
//!            ├────┼────┼────┼────┼────┤
//!   dirty:        ████      ██
//!   upload:       ██████████████
//! ```
//!
//! A partial sync uploads one bounding range over all dirty in-use regions,
//! including any clean bytes between them. One call per frame instead of one
//! per region.

use bytemuck::Pod;
use tracing::{debug, trace};

use crate::allocator::ArenaBook;
use crate::store::BackingStore;

/// Transfer primitive of the remote buffer.
pub trait RemoteMirror {
    /// Replaces the mirror's contents and size with `contents`.
    fn reallocate(&mut self, contents: &[u8]);

    /// Overwrites `source.len()` bytes starting at `byte_offset`.
    fn replace(&mut self, byte_offset: usize, source: &[u8]);
}

impl<M: RemoteMirror + ?Sized> RemoteMirror for Box<M> {
    fn reallocate(&mut self, contents: &[u8]) {
        (**self).reallocate(contents);
    }

    fn replace(&mut self, byte_offset: usize, source: &[u8]) {
        (**self).replace(byte_offset, source);
    }
}

/// What one `synchronize` call transferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to send.
    Skipped,
    /// The store grew; the whole store was sent.
    Full {
        /// Blocks sent.
        blocks: usize,
        /// Bytes sent.
        bytes: usize,
    },
    /// One bounding range of dirty blocks was sent.
    Partial {
        /// First block of the range.
        first_block: usize,
        /// Blocks in the range.
        block_count: usize,
        /// Byte offset within the mirror.
        byte_offset: usize,
        /// Bytes sent.
        bytes: usize,
    },
}

impl SyncOutcome {
    /// Bytes transferred by this call.
    #[inline]
    #[must_use]
    pub const fn bytes(&self) -> usize {
        match *self {
            Self::Skipped => 0,
            Self::Full { bytes, .. } | Self::Partial { bytes, .. } => bytes,
        }
    }
}

/// Lifetime synchronization counters.
///
/// Used for profiling and verifying that partial uploads are paying off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Calls that sent the whole store.
    pub full_uploads: u64,
    /// Calls that sent a bounding range.
    pub partial_uploads: u64,
    /// Calls that sent nothing.
    pub skipped: u64,
    /// Bytes actually sent.
    pub bytes_uploaded: u64,
    /// Bytes that full uploads on every non-skipped call would have sent.
    pub bytes_if_full: u64,
}

impl SyncStats {
    pub(crate) fn record(&mut self, outcome: SyncOutcome, store_bytes: usize) {
        match outcome {
            SyncOutcome::Skipped => {
                self.skipped += 1;
                return;
            }
            SyncOutcome::Full { .. } => self.full_uploads += 1,
            SyncOutcome::Partial { .. } => self.partial_uploads += 1,
        }
        self.bytes_uploaded += outcome.bytes() as u64;
        self.bytes_if_full += store_bytes as u64;
    }

    /// Returns the bandwidth saved by partial uploads (0.0 to 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bandwidth_savings(&self) -> f32 {
        if self.bytes_if_full == 0 {
            0.0
        } else {
            1.0 - (self.bytes_uploaded as f32 / self.bytes_if_full as f32)
        }
    }
}

impl ArenaBook {
    pub(crate) fn synchronize<T: Pod, M: RemoteMirror + ?Sized>(
        &mut self,
        store: &BackingStore<T>,
        mirror: &mut M,
    ) -> SyncOutcome {
        if self.is_mirror_stale() {
            let bytes = store.as_bytes();
            mirror.reallocate(bytes);
            self.remote_blocks = store.local_blocks();
            for region in self.table.regions_mut() {
                region.dirty = false;
            }
            self.any_dirty = false;
            debug!(blocks = self.remote_blocks, bytes = bytes.len(), "full mirror upload");
            return SyncOutcome::Full {
                blocks: self.remote_blocks,
                bytes: bytes.len(),
            };
        }

        if !self.any_dirty {
            return SyncOutcome::Skipped;
        }

        let mut span: Option<(usize, usize)> = None;
        for region in self.table.regions_mut().filter(|r| r.in_use && r.dirty) {
            region.dirty = false;
            span = Some(match span {
                None => (region.start, region.end()),
                Some((left, right)) => (left.min(region.start), right.max(region.end())),
            });
        }
        self.any_dirty = false;

        let Some((left, right)) = span else {
            return SyncOutcome::Skipped;
        };
        let byte_offset = left * store.bytes_per_block();
        let source = store.block_bytes(left, right - left);
        mirror.replace(byte_offset, source);
        trace!(first_block = left, blocks = right - left, bytes = source.len(), "partial mirror upload");

        SyncOutcome::Partial {
            first_block: left,
            block_count: right - left,
            byte_offset,
            bytes: source.len(),
        }
    }
}

/// Kind of a recorded transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    /// `reallocate`
    Reallocate,
    /// `replace`
    Replace,
}

/// One transfer seen by a [`HostMirror`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    /// Which primitive was called.
    pub kind: TransferKind,
    /// Byte offset of the write (0 for reallocation).
    pub byte_offset: usize,
    /// Bytes written.
    pub byte_len: usize,
}

/// Host-memory mirror that keeps a byte copy and a transfer log.
///
/// Stands in for the device buffer in CPU-only builds and tests.
#[derive(Clone, Debug, Default)]
pub struct HostMirror {
    bytes: Vec<u8>,
    log: Vec<Transfer>,
}

impl HostMirror {
    /// Creates an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrored bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Every transfer since creation or the last [`HostMirror::clear_log`].
    #[must_use]
    pub fn transfers(&self) -> &[Transfer] {
        &self.log
    }

    /// Most recent transfer.
    #[must_use]
    pub fn last_transfer(&self) -> Option<Transfer> {
        self.log.last().copied()
    }

    /// Forgets recorded transfers.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }
}

impl RemoteMirror for HostMirror {
    fn reallocate(&mut self, contents: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(contents);
        self.log.push(Transfer {
            kind: TransferKind::Reallocate,
            byte_offset: 0,
            byte_len: contents.len(),
        });
    }

    fn replace(&mut self, byte_offset: usize, source: &[u8]) {
        let end = byte_offset + source.len();
        assert!(
            end <= self.bytes.len(),
            "replace of {} bytes at {byte_offset} overruns mirror of {} bytes",
            source.len(),
            self.bytes.len()
        );
        self.bytes[byte_offset..end].copy_from_slice(source);
        self.log.push(Transfer {
            kind: TransferKind::Replace,
            byte_offset,
            byte_len: source.len(),
        });
    }
}
