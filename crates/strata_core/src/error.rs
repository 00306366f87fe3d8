//! # Error Types
//!
//! Allocation and configuration errors.
//!
//! Contract violations (zero-sized requests, touching an empty handle) are
//! not represented here. They panic at the call site.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while growing or inspecting a block allocator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The host allocator refused to grow the backing store.
    #[error("out of host memory: cannot grow store to {requested_blocks} blocks")]
    OutOfMemory {
        /// Block count the store tried to reach.
        requested_blocks: usize,
    },

    /// Block or element arithmetic overflowed `usize`.
    #[error("capacity overflow: {blocks} blocks of {elements_per_block} elements")]
    CapacityOverflow {
        /// Block count that could not be represented.
        blocks: usize,
        /// Granularity in use.
        elements_per_block: usize,
    },

    /// Region bookkeeping no longer matches the store.
    #[error("region table corrupted: {reason}")]
    Corrupted {
        /// What check failed.
        reason: String,
    },
}

/// Result type for allocator operations.
pub type AllocResult<T> = Result<T, AllocError>;

/// Errors raised while loading allocator configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or schema error.
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
