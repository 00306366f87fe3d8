//! # Mesh Pool
//!
//! Packs many meshes into one block allocator so the whole set lives in a
//! single device buffer and uploads with at most one transfer per frame.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut pool = MeshPool::new(BlockLayout::new(Primitive::Quad, 4), GpuMirror::vertex(device, queue, "meshes"));
//!
//! let rock = pool.insert(&rock_vertices)?;
//! pool.update(rock, &deformed_vertices)?;
//!
//! // Once per frame, before encoding draws:
//! pool.synchronize();
//! for range in pool.draw_ranges()? {
//!     pass.draw(range.first_vertex..range.first_vertex + range.vertex_count, 0..1);
//! }
//! ```

use std::collections::HashMap;

use bytemuck::Pod;
use strata_core::{
    AllocError, AllocationHandle, BlockAllocator, HostMirror, RemoteMirror, SyncOutcome,
};
use thiserror::Error;
use tracing::{trace, warn};

use crate::layout::BlockLayout;

/// Identifier of a pooled mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(u32);

impl MeshId {
    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Errors raised by the mesh pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// No mesh with this id.
    #[error("unknown mesh {0:?}")]
    UnknownMesh(MeshId),

    /// Meshes must contain at least one vertex.
    #[error("mesh has no vertices")]
    EmptyMesh,

    /// Vertex range does not fit a 32-bit draw call.
    #[error("vertex range of mesh {0:?} exceeds u32")]
    RangeOverflow(MeshId),

    /// Underlying allocation failed.
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Vertex range of one mesh in the pooled buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawRange {
    /// Mesh drawn by this range.
    pub mesh: MeshId,
    /// First vertex in the buffer.
    pub first_vertex: u32,
    /// Vertices to draw.
    pub vertex_count: u32,
}

struct MeshSlot<V> {
    handle: AllocationHandle<V>,
    vertex_count: usize,
    /// Whether the contents reached the mirror at least once.
    uploaded: bool,
}

/// Meshes packed into one block allocator.
pub struct MeshPool<V, M = HostMirror> {
    allocator: BlockAllocator<V, M>,
    layout: BlockLayout,
    meshes: HashMap<MeshId, MeshSlot<V>>,
    next_id: u32,
}

impl<V: Pod, M: RemoteMirror> MeshPool<V, M> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(layout: BlockLayout, mirror: M) -> Self {
        Self::with_allocator(layout, BlockAllocator::new(layout.elements_per_block(), mirror))
    }

    /// Wraps an existing allocator.
    ///
    /// # Panics
    ///
    /// Panics if the allocator's granularity differs from the layout's.
    #[must_use]
    pub fn with_allocator(layout: BlockLayout, allocator: BlockAllocator<V, M>) -> Self {
        assert_eq!(
            allocator.elements_per_block(),
            layout.elements_per_block(),
            "allocator granularity does not match block layout"
        );
        Self {
            allocator,
            layout,
            meshes: HashMap::new(),
            next_id: 1,
        }
    }

    /// Stores a new mesh.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::EmptyMesh`] for an empty slice and
    /// [`MeshError::Alloc`] if the store cannot grow.
    pub fn insert(&mut self, vertices: &[V]) -> Result<MeshId, MeshError> {
        let handle = self.allocate_for(vertices)?;
        let id = MeshId(self.next_id);
        self.next_id += 1;
        trace!(mesh = id.raw(), vertices = vertices.len(), blocks = handle.block_count(), "mesh inserted");
        self.meshes.insert(
            id,
            MeshSlot {
                handle,
                vertex_count: vertices.len(),
                uploaded: false,
            },
        );
        Ok(id)
    }

    /// Replaces a mesh's vertices.
    ///
    /// Written in place when the new data fits the mesh's blocks; otherwise
    /// the mesh moves to a new region and the old one is released.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::UnknownMesh`], [`MeshError::EmptyMesh`], or
    /// [`MeshError::Alloc`] if relocation needs growth that fails.
    pub fn update(&mut self, id: MeshId, vertices: &[V]) -> Result<(), MeshError> {
        let fits = {
            let slot = self.meshes.get(&id).ok_or(MeshError::UnknownMesh(id))?;
            if vertices.is_empty() {
                return Err(MeshError::EmptyMesh);
            }
            if !slot.uploaded {
                warn!(mesh = id.raw(), "mesh replaced before it was ever synchronized");
            }
            vertices.len() <= slot.handle.element_count()
        };

        if fits {
            if let Some(slot) = self.meshes.get_mut(&id) {
                slot.handle.write(vertices);
                slot.vertex_count = vertices.len();
            }
            return Ok(());
        }

        let handle = self.allocate_for(vertices)?;
        if let Some(slot) = self.meshes.get_mut(&id) {
            // Old handle drops here and its region becomes free.
            slot.handle = handle;
            slot.vertex_count = vertices.len();
            slot.uploaded = false;
        }
        Ok(())
    }

    /// Removes a mesh, freeing its blocks for reuse.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::UnknownMesh`] if the id is not pooled.
    pub fn remove(&mut self, id: MeshId) -> Result<(), MeshError> {
        self.meshes
            .remove(&id)
            .map(drop)
            .ok_or(MeshError::UnknownMesh(id))
    }

    fn allocate_for(&mut self, vertices: &[V]) -> Result<AllocationHandle<V>, MeshError> {
        if vertices.is_empty() {
            return Err(MeshError::EmptyMesh);
        }
        let handle = self.allocator.try_allocate(self.layout.blocks_for(vertices.len()))?;
        handle.write(vertices);
        Ok(handle)
    }

    /// Uploads pending changes. Call once per frame before drawing.
    pub fn synchronize(&mut self) -> SyncOutcome {
        let outcome = self.allocator.synchronize();
        for slot in self.meshes.values_mut() {
            slot.uploaded = true;
        }
        outcome
    }

    /// Vertex ranges of every mesh, ordered by position in the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::RangeOverflow`] if a range does not fit `u32`.
    pub fn draw_ranges(&self) -> Result<Vec<DrawRange>, MeshError> {
        let mut ranges = self
            .meshes
            .iter()
            .map(|(&mesh, slot)| {
                let overflow = |_| MeshError::RangeOverflow(mesh);
                Ok(DrawRange {
                    mesh,
                    first_vertex: u32::try_from(slot.handle.offset()).map_err(overflow)?,
                    vertex_count: u32::try_from(slot.vertex_count).map_err(overflow)?,
                })
            })
            .collect::<Result<Vec<_>, MeshError>>()?;
        ranges.sort_by_key(|range| range.first_vertex);
        Ok(ranges)
    }

    /// Vertex count of a mesh.
    #[must_use]
    pub fn vertex_count(&self, id: MeshId) -> Option<usize> {
        self.meshes.get(&id).map(|slot| slot.vertex_count)
    }
}

impl<V, M> MeshPool<V, M> {
    /// Number of pooled meshes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether the pool holds no meshes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Whether `id` is pooled.
    #[must_use]
    pub fn contains(&self, id: MeshId) -> bool {
        self.meshes.contains_key(&id)
    }

    /// Block layout in use.
    #[must_use]
    pub const fn layout(&self) -> BlockLayout {
        self.layout
    }

    /// Underlying allocator.
    #[must_use]
    pub fn allocator(&self) -> &BlockAllocator<V, M> {
        &self.allocator
    }
}

#[cfg(test)]
mod tests {
    use strata_core::HostMirror;

    use super::*;
    use crate::layout::Primitive;
    use crate::Vertex;

    fn pool() -> MeshPool<Vertex> {
        MeshPool::new(BlockLayout::new(Primitive::Triangle, 1), HostMirror::new())
    }

    fn triangles(count: usize, tag: f32) -> Vec<Vertex> {
        vec![Vertex::new([tag, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0; 4]); count * 3]
    }

    #[test]
    fn test_insert_and_draw_ranges() {
        let mut pool = pool();
        let a = pool.insert(&triangles(2, 1.0)).unwrap();
        let b = pool.insert(&triangles(1, 2.0)).unwrap();

        let ranges = pool.draw_ranges().unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0], DrawRange { mesh: a, first_vertex: 0, vertex_count: 6 });
        assert_eq!(ranges[1], DrawRange { mesh: b, first_vertex: 6, vertex_count: 3 });
    }

    #[test]
    fn test_update_in_place() {
        let mut pool = pool();
        let a = pool.insert(&triangles(2, 1.0)).unwrap();
        pool.synchronize();

        pool.update(a, &triangles(1, 5.0)).unwrap();
        assert_eq!(pool.vertex_count(a), Some(3));
        assert_eq!(pool.draw_ranges().unwrap()[0].first_vertex, 0);
        assert!(matches!(pool.synchronize(), SyncOutcome::Partial { first_block: 0, .. }));
    }

    #[test]
    fn test_update_relocates_when_too_big() {
        let mut pool = pool();
        let a = pool.insert(&triangles(1, 1.0)).unwrap();
        let _b = pool.insert(&triangles(1, 2.0)).unwrap();

        pool.update(a, &triangles(3, 3.0)).unwrap();
        let range = pool.draw_ranges().unwrap().into_iter().find(|r| r.mesh == a).unwrap();
        assert_eq!(range.vertex_count, 9);
        assert_ne!(range.first_vertex, 0);
        assert_eq!(pool.allocator().stats().live_handles, 2);
    }

    #[test]
    fn test_remove_frees_blocks() {
        let mut pool = pool();
        let a = pool.insert(&triangles(4, 1.0)).unwrap();
        pool.remove(a).unwrap();

        assert!(pool.is_empty());
        assert_eq!(pool.allocator().stats().used_blocks, 0);
        assert_eq!(pool.remove(a), Err(MeshError::UnknownMesh(a)));
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let mut pool = pool();
        assert_eq!(pool.insert(&[]), Err(MeshError::EmptyMesh));
    }

    #[test]
    fn test_mirror_receives_vertices() {
        let mut pool = pool();
        let verts = triangles(1, 7.0);
        pool.insert(&verts).unwrap();
        pool.synchronize();

        let expected: &[u8] = bytemuck::cast_slice(&verts);
        assert_eq!(&pool.allocator().mirror().bytes()[..expected.len()], expected);
    }
}
