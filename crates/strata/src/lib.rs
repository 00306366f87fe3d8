//! # STRATA
//!
//! Block-allocated GPU buffers: many small meshes in one device buffer,
//! uploaded with at most one transfer per frame.
//!
//! ## Crates
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │ strata_core              │◄─────│ strata_rendering         │
//! │  • RegionTable           │      │  • Vertex / BlockLayout  │
//! │  • BlockAllocator        │      │  • MeshPool              │
//! │  • AllocationHandle      │      │  • GpuMirror (wgpu)      │
//! │  • Sync engine           │      └──────────────────────────┘
//! └──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `sim`: deterministic frame simulator behind the `frame_sim` binary

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod sim;

pub use strata_core as core;
pub use strata_rendering as rendering;

pub use strata_core::{
    AllocError, AllocationHandle, AllocatorConfig, AllocatorStats, BlockAllocator, HostMirror,
    RemoteMirror, SyncOutcome, SyncStats,
};
pub use strata_rendering::{BlockLayout, DrawRange, MeshId, MeshPool, Primitive, Vertex};
