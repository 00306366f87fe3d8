//! # STRATA Core
//!
//! Block sub-allocator for vertex, index and uniform data, designed for:
//! - Many small, long-lived meshes sharing one device buffer
//! - Uploading only what changed since the last frame
//! - Zero bookkeeping work on release
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       BlockAllocator                           │
//! │  ┌──────────────┐   ┌──────────────┐   ┌────────────────────┐  │
//! │  │ RegionTable  │◄─►│ BackingStore │──►│ RemoteMirror       │  │
//! │  │ (free/used)  │   │ (host copy)  │   │ (device copy)      │  │
//! │  └──────▲───────┘   └──────────────┘   └────────────────────┘  │
//! └─────────┼──────────────────────────────────────────────────────┘
//!           │ by RegionId
//!   AllocationHandle ── write / mark_dirty ──► synchronize()
//! ```
//!
//! ## Rules
//!
//! 1. **Single owner** - no locks; the allocator and its handles are `!Send`
//! 2. **Growth moves memory** - never hold an element view across `allocate`
//! 3. **Writes are invisible** - mark the handle dirty after writing
//!
//! ## Example
//!
//! ```rust
//! use strata_core::{BlockAllocator, HostMirror, SyncOutcome};
//!
//! let mut allocator = BlockAllocator::<f32>::with_capacity(3, 100, HostMirror::new())?;
//! allocator.synchronize();
//!
//! let triangle = allocator.allocate(1);
//! triangle.write(&[0.0, 1.0, 2.0]);
//! assert!(matches!(allocator.synchronize(), SyncOutcome::Partial { .. }));
//! # Ok::<(), strata_core::AllocError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod handle;
pub mod region;
pub mod store;
pub mod sync;

pub use allocator::{AllocatorStats, BlockAllocator};
pub use config::AllocatorConfig;
pub use error::{AllocError, AllocResult, ConfigError};
pub use handle::AllocationHandle;
pub use region::{Coalesced, Region, RegionId, RegionTable};
pub use store::BackingStore;
pub use sync::{HostMirror, RemoteMirror, SyncOutcome, SyncStats, Transfer, TransferKind};
