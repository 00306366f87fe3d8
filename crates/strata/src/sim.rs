//! # Frame Simulator
//!
//! Headless mesh churn against a [`MeshPool`] backed by a [`HostMirror`].
//!
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────┐
//! │ 1. REMOVE   random live meshes (blocks become free)         │
//! │ 2. UPDATE   rewrite random meshes (in place or relocated)   │
//! │ 3. INSERT   new meshes (first-fit, coalesce, or grow)       │
//! │ 4. SYNC     one full or partial transfer to the mirror      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The same seed always produces the same sequence of allocations and
//! transfers.
//!
//! ```toml
//! frames = 600
//! seed = 7
//! label = "sim-meshes"
//! initial_blocks = 128
//!
//! [layout]
//! primitive = "triangle"
//! primitives_per_block = 4
//!
//! [churn]
//! inserts_per_frame = 4
//! removes_per_frame = 3
//! updates_per_frame = 2
//! max_primitives = 48
//! ```

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use strata_core::{AllocatorStats, BlockAllocator, ConfigError, HostMirror, SyncOutcome, SyncStats};
use strata_rendering::{BlockLayout, MeshError, MeshId, MeshPool, Vertex};
use tracing::{debug, info};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Per-frame mesh churn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    /// Meshes inserted each frame.
    pub inserts_per_frame: u32,
    /// Meshes removed each frame (fewer if fewer are live).
    pub removes_per_frame: u32,
    /// Meshes rewritten each frame.
    pub updates_per_frame: u32,
    /// Upper bound on primitives per generated mesh.
    pub max_primitives: usize,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            inserts_per_frame: 4,
            removes_per_frame: 3,
            updates_per_frame: 2,
            max_primitives: 48,
        }
    }
}

/// Simulator configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Frames to run.
    pub frames: u64,
    /// RNG seed.
    pub seed: u64,
    /// Allocator label used in log output.
    pub label: String,
    /// Blocks reserved before the first frame.
    pub initial_blocks: usize,
    /// Block granularity.
    pub layout: BlockLayout,
    /// Mesh churn.
    pub churn: ChurnConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            seed: 0x5EED,
            label: "sim-meshes".to_owned(),
            initial_blocks: 128,
            layout: BlockLayout::default(),
            churn: ChurnConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// errors of [`SimConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks that the values describe a runnable simulation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero block layout, zero
    /// `max_primitives`, or an invalid derived allocator config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layout.primitives_per_block == 0 {
            return Err(ConfigError::Invalid(
                "layout.primitives_per_block must be greater than zero".to_owned(),
            ));
        }
        if self.churn.max_primitives == 0 {
            return Err(ConfigError::Invalid(
                "churn.max_primitives must be greater than zero".to_owned(),
            ));
        }
        self.layout
            .allocator_config(&self.label, self.initial_blocks)
            .validate()
    }
}

// =============================================================================
// SIMULATOR
// =============================================================================

/// What one frame did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number, starting at 0.
    pub frame: u64,
    /// Meshes inserted.
    pub inserted: u32,
    /// Meshes removed.
    pub removed: u32,
    /// Meshes rewritten.
    pub updated: u32,
    /// Meshes live after the frame.
    pub live_meshes: usize,
    /// Transfer issued by the end-of-frame sync.
    pub outcome: SyncOutcome,
}

/// End-of-run totals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimSummary {
    /// Frames run.
    pub frames: u64,
    /// Meshes live at the end.
    pub live_meshes: usize,
    /// Final allocator state.
    pub allocator: AllocatorStats,
    /// Lifetime sync counters.
    pub sync: SyncStats,
}

/// Deterministic mesh churn driver.
pub struct FrameSim {
    config: SimConfig,
    pool: MeshPool<Vertex, HostMirror>,
    rng: ChaCha8Rng,
    live: Vec<MeshId>,
    frame: u64,
}

impl FrameSim {
    /// Builds a simulator from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Alloc`] if the initial store cannot be allocated.
    pub fn new(config: SimConfig) -> Result<Self, MeshError> {
        let allocator_config = config
            .layout
            .allocator_config(&config.label, config.initial_blocks);
        let allocator = BlockAllocator::from_config(&allocator_config, HostMirror::new())?;
        let pool = MeshPool::with_allocator(config.layout, allocator);
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            pool,
            rng,
            live: Vec::new(),
            frame: 0,
        })
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Alloc`] if the store cannot grow.
    pub fn step(&mut self) -> Result<FrameReport, MeshError> {
        let churn = self.config.churn.clone();

        let mut removed = 0;
        for _ in 0..churn.removes_per_frame {
            if self.live.is_empty() {
                break;
            }
            let victim = self.rng.gen_range(0..self.live.len());
            let id = self.live.swap_remove(victim);
            self.pool.remove(id)?;
            removed += 1;
        }

        let mut updated = 0;
        for _ in 0..churn.updates_per_frame {
            if self.live.is_empty() {
                break;
            }
            let id = self.live[self.rng.gen_range(0..self.live.len())];
            let vertices = self.random_mesh();
            self.pool.update(id, &vertices)?;
            updated += 1;
        }

        for _ in 0..churn.inserts_per_frame {
            let vertices = self.random_mesh();
            let id = self.pool.insert(&vertices)?;
            self.live.push(id);
        }

        let outcome = self.pool.synchronize();
        let report = FrameReport {
            frame: self.frame,
            inserted: churn.inserts_per_frame,
            removed,
            updated,
            live_meshes: self.live.len(),
            outcome,
        };
        debug!(
            frame = report.frame,
            live = report.live_meshes,
            bytes = outcome.bytes(),
            "frame complete"
        );
        self.frame += 1;
        Ok(report)
    }

    /// Runs every configured frame.
    ///
    /// # Errors
    ///
    /// Returns the first frame error.
    pub fn run(&mut self) -> Result<SimSummary, MeshError> {
        while self.frame < self.config.frames {
            self.step()?;
        }
        let summary = self.summary();
        info!(
            frames = summary.frames,
            meshes = summary.live_meshes,
            blocks = summary.allocator.local_blocks,
            fragmentation = summary.allocator.fragmentation(),
            savings = summary.sync.bandwidth_savings(),
            "simulation finished"
        );
        Ok(summary)
    }

    /// Current totals.
    #[must_use]
    pub fn summary(&self) -> SimSummary {
        SimSummary {
            frames: self.frame,
            live_meshes: self.live.len(),
            allocator: self.pool.allocator().stats(),
            sync: self.pool.allocator().sync_stats(),
        }
    }

    /// Mesh pool under simulation.
    #[must_use]
    pub fn pool(&self) -> &MeshPool<Vertex, HostMirror> {
        &self.pool
    }

    fn random_mesh(&mut self) -> Vec<Vertex> {
        let primitives = self.rng.gen_range(1..=self.config.churn.max_primitives);
        let count = primitives * self.config.layout.primitive.vertices();
        let tint = [self.rng.gen(), self.rng.gen(), self.rng.gen(), 1.0];
        (0..count)
            .map(|_| {
                let position = [
                    self.rng.gen_range(-64.0..64.0),
                    self.rng.gen_range(0.0..32.0),
                    self.rng.gen_range(-64.0..64.0),
                ];
                Vertex::new(position, [0.0, 1.0, 0.0], tint)
            })
            .collect()
    }
}
