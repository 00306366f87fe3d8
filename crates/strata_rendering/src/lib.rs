//! # STRATA Rendering
//!
//! GPU mesh storage on top of the block allocator.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  insert/update   ┌──────────────────┐  synchronize  ┌───────────┐
//! │   MeshPool    │ ───────────────► │  BlockAllocator  │ ────────────► │ GpuMirror │
//! │ (MeshId→slot) │ ◄─────────────── │ (Vertex blocks)  │  one transfer │ (wgpu)    │
//! └───────────────┘   draw ranges    └──────────────────┘               └───────────┘
//! ```
//!
//! Block granularity comes from [`BlockLayout`]: a whole number of
//! primitives per block, so every allocation starts on a primitive boundary.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod gpu_mirror;
pub mod layout;
pub mod mesh_pool;
pub mod vertex;

pub use gpu_mirror::{aligned_span, is_copy_aligned, GpuMirror};
pub use layout::{BlockLayout, Primitive};
pub use mesh_pool::{DrawRange, MeshError, MeshId, MeshPool};
pub use vertex::Vertex;
