//! # Block Layout
//!
//! Derives the allocator's block granularity from what a block should hold:
//! a whole number of primitives, so no primitive ever straddles two
//! allocations.

use serde::{Deserialize, Serialize};
use strata_core::AllocatorConfig;

/// Primitive topology of pooled geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    /// One vertex per point.
    Point,
    /// Two vertices per line.
    Line,
    /// Three vertices per triangle.
    Triangle,
    /// Four vertices per quad (expanded by an index buffer).
    Quad,
}

impl Primitive {
    /// Vertices making up one primitive.
    #[inline]
    #[must_use]
    pub const fn vertices(self) -> usize {
        match self {
            Self::Point => 1,
            Self::Line => 2,
            Self::Triangle => 3,
            Self::Quad => 4,
        }
    }
}

/// Block granularity expressed in primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLayout {
    /// Topology stored in the pool.
    pub primitive: Primitive,
    /// Primitives per block.
    pub primitives_per_block: usize,
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self {
            primitive: Primitive::Quad,
            primitives_per_block: 1,
        }
    }
}

impl BlockLayout {
    /// Creates a layout.
    ///
    /// # Panics
    ///
    /// Panics if `primitives_per_block` is zero.
    #[must_use]
    pub fn new(primitive: Primitive, primitives_per_block: usize) -> Self {
        assert!(primitives_per_block > 0, "primitives_per_block must be greater than zero");
        Self {
            primitive,
            primitives_per_block,
        }
    }

    /// Vertices per block.
    #[inline]
    #[must_use]
    pub const fn elements_per_block(&self) -> usize {
        self.primitive.vertices() * self.primitives_per_block
    }

    /// Blocks needed to hold `vertices` vertices.
    #[inline]
    #[must_use]
    pub const fn blocks_for(&self, vertices: usize) -> usize {
        vertices.div_ceil(self.elements_per_block())
    }

    /// Allocator config with this layout's granularity.
    #[must_use]
    pub fn allocator_config(&self, label: &str, initial_blocks: usize) -> AllocatorConfig {
        AllocatorConfig {
            label: label.to_owned(),
            elements_per_block: self.elements_per_block(),
            initial_blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elements_per_block() {
        assert_eq!(BlockLayout::new(Primitive::Triangle, 1).elements_per_block(), 3);
        assert_eq!(BlockLayout::new(Primitive::Quad, 8).elements_per_block(), 32);
    }

    #[test]
    fn test_blocks_for_rounds_up() {
        let layout = BlockLayout::new(Primitive::Triangle, 2);
        assert_eq!(layout.blocks_for(1), 1);
        assert_eq!(layout.blocks_for(6), 1);
        assert_eq!(layout.blocks_for(7), 2);
        assert_eq!(layout.blocks_for(0), 0);
    }

    #[test]
    fn test_allocator_config() {
        let config = BlockLayout::new(Primitive::Line, 4).allocator_config("lines", 32);
        assert_eq!(config.elements_per_block, 8);
        assert_eq!(config.initial_blocks, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_layout_from_toml() {
        let layout: BlockLayout =
            toml::from_str("primitive = \"triangle\"\nprimitives_per_block = 16").unwrap();
        assert_eq!(layout.primitive, Primitive::Triangle);
        assert_eq!(layout.elements_per_block(), 48);
    }
}
