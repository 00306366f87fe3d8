//! # GPU Mirror
//!
//! `wgpu` buffer implementing the allocator's transfer primitive.
//!
//! - `reallocate` creates a fresh buffer sized to the store (growth path)
//! - `replace` is a single `Queue::write_buffer` (steady-state path)
//!
//! `write_buffer` requires offsets and lengths that are multiples of
//! [`wgpu::COPY_BUFFER_ALIGNMENT`]. Block ranges of element types such as
//! `u16` indices with three elements per block do not satisfy this, so the
//! mirror keeps a host shadow of the buffer and widens each write to the
//! enclosing aligned span:
//!
//! ```text
//!   bytes:   0   4   8   12  16  20  24
//!            ├───┼───┼───┼───┼───┼───┤
//!   dirty:         ██████               replace(6, 6 bytes)
//!   sent:        ████████               write_buffer(4, 8 bytes)
//! ```

use std::ops::Range;
use std::sync::Arc;

use strata_core::RemoteMirror;
use tracing::{debug, trace};
use wgpu::util::DeviceExt;

const ALIGN: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;

/// Whether every block-aligned byte range of `T` can be written without
/// widening.
#[inline]
#[must_use]
pub const fn is_copy_aligned<T>() -> bool {
    std::mem::size_of::<T>() % ALIGN == 0
}

/// Smallest `COPY_BUFFER_ALIGNMENT`-aligned span containing
/// `byte_offset..byte_offset + len`, clipped to `padded_len`.
///
/// `padded_len` must itself be aligned.
#[inline]
#[must_use]
pub fn aligned_span(byte_offset: usize, len: usize, padded_len: usize) -> Range<usize> {
    let start = byte_offset / ALIGN * ALIGN;
    let end = (byte_offset + len).div_ceil(ALIGN) * ALIGN;
    start..end.min(padded_len)
}

/// Device-resident mirror of a block allocator's store.
pub struct GpuMirror {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    usage: wgpu::BufferUsages,
    label: String,
    buffer: Option<wgpu::Buffer>,
    /// Host copy of the buffer, padded to `COPY_BUFFER_ALIGNMENT`.
    shadow: Vec<u8>,
    /// Bytes of the store the buffer holds (excluding padding).
    len: usize,
}

impl GpuMirror {
    /// Creates a mirror. No device buffer exists until the first sync.
    ///
    /// `usage` is extended with `COPY_DST`.
    #[must_use]
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        usage: wgpu::BufferUsages,
        label: impl Into<String>,
    ) -> Self {
        Self {
            device,
            queue,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            label: label.into(),
            buffer: None,
            shadow: Vec::new(),
            len: 0,
        }
    }

    /// Mirror for vertex data.
    #[must_use]
    pub fn vertex(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, label: impl Into<String>) -> Self {
        Self::new(device, queue, wgpu::BufferUsages::VERTEX, label)
    }

    /// Mirror for index data (`u16` or `u32`).
    #[must_use]
    pub fn index(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, label: impl Into<String>) -> Self {
        Self::new(device, queue, wgpu::BufferUsages::INDEX, label)
    }

    /// Current device buffer. Replaced on every growth, so re-fetch it each
    /// frame instead of caching it.
    #[must_use]
    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    /// Store bytes held by the device buffer.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the device buffer holds nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl RemoteMirror for GpuMirror {
    fn reallocate(&mut self, contents: &[u8]) {
        self.shadow.clear();
        self.shadow.extend_from_slice(contents);
        self.shadow.resize(contents.len().div_ceil(ALIGN) * ALIGN, 0);

        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&self.label),
            contents: &self.shadow,
            usage: self.usage,
        });
        if let Some(old) = self.buffer.replace(buffer) {
            old.destroy();
        }
        self.len = contents.len();
        debug!(label = %self.label, bytes = contents.len(), "device buffer reallocated");
    }

    fn replace(&mut self, byte_offset: usize, source: &[u8]) {
        let end = byte_offset + source.len();
        assert!(
            end <= self.len,
            "device write of {} bytes at {byte_offset} past end of {}-byte mirror",
            source.len(),
            self.len
        );
        self.shadow[byte_offset..end].copy_from_slice(source);

        let span = aligned_span(byte_offset, source.len(), self.shadow.len());
        if span.len() != source.len() {
            trace!(label = %self.label, from = byte_offset, to = span.start, bytes = span.len(), "device write widened");
        }
        if let Some(buffer) = &self.buffer {
            self.queue
                .write_buffer(buffer, span.start as wgpu::BufferAddress, &self.shadow[span]);
        }
    }
}
