//! Vertex formats for pooled meshes.

use bytemuck::{Pod, Zeroable};

// =============================================================================
// VERTEX FORMAT - Standard vertex buffer layout
// =============================================================================

/// Lit, vertex-colored mesh vertex (40 bytes, 4-byte aligned fields).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in world space [x, y, z]
    pub position: [f32; 3],
    /// Normal direction [nx, ny, nz]
    pub normal: [f32; 3],
    /// Linear RGBA color
    pub color: [f32; 4],
}

impl Vertex {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Vertex attributes for WGPU
    pub const ATTRIBS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3,  // position
        1 => Float32x3,  // normal
        2 => Float32x4,  // color
    ];

    /// Creates a vertex.
    #[must_use]
    pub const fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 4]) -> Self {
        Self {
            position,
            normal,
            color,
        }
    }

    /// Vertex buffer layout descriptor
    #[must_use]
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}
