//! A binary-buddy sub-allocator for fixed-size arenas.
//!
//! [`BuddyAllocator`] manages a linear address space of `capacity` bytes and
//! hands out byte offsets into it. It never touches the arena itself: the
//! arena may be a GPU buffer, a heap allocation or a memory-mapped file, and
//! copying data to the returned offsets is left to the caller.
//!
//! The tree of blocks is never materialized. Each node is identified by its
//! breadth-first index in an implicit perfect binary tree, and the allocator
//! keeps only three pieces of metadata keyed by that index: a bit per internal
//! node recording whether it is split, a bit per sibling pair recording
//! whether exactly one of the pair is in use, and an ordered set of free
//! nodes.
//!
//! ```
//! use arena_buddy::{BuddyAllocator, BuddyConfig};
//!
//! let mut buddy = BuddyAllocator::new(BuddyConfig::default()).unwrap();
//!
//! let a = buddy.allocate(12).unwrap();
//! let b = buddy.allocate(8000).unwrap();
//! assert_ne!(a.offset(), b.offset());
//!
//! buddy.free(a.offset()).unwrap();
//! buddy.free(b.offset()).unwrap();
//! assert!(buddy.is_empty());
//! ```

#![doc(html_root_url = "https://docs.rs/arena_buddy/0.1.0")]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docs_rs, feature(doc_cfg))]

extern crate alloc;

mod bitmap;
pub mod buddy;
mod config;
mod free_set;
mod geometry;
mod tracker;


use core::fmt;

pub use crate::{
    buddy::{Block, BuddyAllocator, RefCellBuddyAllocator},
    config::BuddyConfig,
};

#[cfg(feature = "std")]
pub use crate::buddy::MutexBuddyAllocator;

/// The error type for allocator constructors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocInitError {
    /// The configuration of the allocator is invalid.
    ///
    /// This variant is returned when an allocator's configuration
    /// parameters are impossible to satisfy.
    InvalidConfig(ConfigError),

    /// The allocator's metadata could not be allocated.
    AllocFailed {
        /// The size in bytes of the rejected request.
        bytes: usize,
    },
}

impl fmt::Display for AllocInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocInitError::InvalidConfig(e) => write!(f, "invalid allocator configuration: {e}"),
            AllocInitError::AllocFailed { bytes } => {
                write!(f, "failed to allocate {bytes} bytes of allocator metadata")
            }
        }
    }
}

impl core::error::Error for AllocInitError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            AllocInitError::InvalidConfig(e) => Some(e),
            AllocInitError::AllocFailed { .. } => None,
        }
    }
}

impl From<ConfigError> for AllocInitError {
    fn from(e: ConfigError) -> Self {
        AllocInitError::InvalidConfig(e)
    }
}

/// Describes why a [`BuddyConfig`] was rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The leaf size is zero or not a power of two.
    LeafSizeNotPowerOfTwo(usize),
    /// The tree must have at least one level.
    ZeroLevels,
    /// The number of levels exceeds [`BuddyConfig::MAX_LEVELS`] or is too
    /// large for the capacity to fit in a `usize`.
    TooManyLevels(usize),
    /// The capacity does not equal `leaf_size << (max_levels - 1)`.
    CapacityMismatch {
        /// The capacity implied by the leaf size and level count.
        expected: usize,
        /// The capacity that was configured.
        actual: usize,
    },
    /// The capacity is not a power-of-two multiple of the leaf size.
    CapacityNotPowerOfTwoMultiple {
        /// The configured capacity.
        capacity: usize,
        /// The configured leaf size.
        leaf_size: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LeafSizeNotPowerOfTwo(leaf) => {
                write!(f, "leaf size {leaf} is not a nonzero power of two")
            }
            ConfigError::ZeroLevels => f.write_str("allocator must have at least one level"),
            ConfigError::TooManyLevels(levels) => {
                write!(f, "{levels} levels exceed the supported tree depth")
            }
            ConfigError::CapacityMismatch { expected, actual } => write!(
                f,
                "capacity {actual} does not match leaf size and level count (expected {expected})"
            ),
            ConfigError::CapacityNotPowerOfTwoMultiple {
                capacity,
                leaf_size,
            } => write!(
                f,
                "capacity {capacity} is not a power-of-two multiple of leaf size {leaf_size}"
            ),
        }
    }
}

impl core::error::Error for ConfigError {}

/// Indicates an allocation failure due to resource exhaustion or an
/// unsatisfiable request.
///
/// Both variants leave the allocator unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The request is larger than the whole arena.
    OversizedRequest {
        /// The requested size in bytes.
        size: usize,
        /// The capacity of the arena.
        capacity: usize,
    },
    /// No free block large enough to satisfy the request exists.
    OutOfMemory {
        /// The requested size in bytes.
        size: usize,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OversizedRequest { size, capacity } => write!(
                f,
                "requested {size} bytes from an arena of {capacity} bytes"
            ),
            AllocError::OutOfMemory { size } => {
                write!(f, "out of memory: no free block holds {size} bytes")
            }
        }
    }
}

impl core::error::Error for AllocError {}

/// Indicates that a free was rejected because the offset does not name a live
/// allocation.
///
/// A rejected free leaves the allocator unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FreeError {
    /// The offset lies outside the arena.
    OutOfBounds {
        /// The offset passed to `free`.
        offset: usize,
        /// The capacity of the arena.
        capacity: usize,
    },
    /// The offset points into a block but not at its start.
    Misaligned {
        /// The offset passed to `free`.
        offset: usize,
    },
    /// The block at the offset is free, either because it was already freed
    /// or because it was never allocated.
    NotAllocated {
        /// The offset passed to `free`.
        offset: usize,
    },
}

impl fmt::Display for FreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreeError::OutOfBounds { offset, capacity } => write!(
                f,
                "offset {offset:#x} is outside the arena of {capacity:#x} bytes"
            ),
            FreeError::Misaligned { offset } => {
                write!(f, "offset {offset:#x} is not the start of an allocated block")
            }
            FreeError::NotAllocated { offset } => {
                write!(f, "block at offset {offset:#x} is not allocated")
            }
        }
    }
}

impl core::error::Error for FreeError {}
