//! A binary-buddy allocator over integer offsets.

use core::{cell::RefCell, fmt, ops::Range};

#[cfg(feature = "std")]
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    free_set::FreeSet,
    geometry::Geometry,
    tracker::{BuddyPairTracker, SplitTracker},
    AllocError, AllocInitError, BuddyConfig, FreeError,
};

/// Declares a wrapper that shares a `BuddyAllocator` behind an interior
/// mutability or locking primitive.
macro_rules! declare_wrappers {
    ($(
        $(#[$attr:meta])*
        $wrapper:ident uses $typename:ident via $method:path, into_inner via $into_inner:path
    )*) => {
        $(
            #[doc = concat!("A `BuddyAllocator` wrapped by a `", stringify!($typename), "`.")]
            ///
            /// Every operation takes exclusive access to the whole allocator for
            /// its duration.
            $(#[$attr])*
            #[derive(Debug)]
            pub struct $wrapper {
                inner: $typename<BuddyAllocator>,
            }

            impl $wrapper {
                /// Constructs a new wrapped allocator.
                ///
                /// # Errors
                ///
                /// Returns an error if `config` is invalid or the allocator
                /// metadata cannot be allocated.
                pub fn new(config: BuddyConfig) -> Result<$wrapper, AllocInitError> {
                    Ok($wrapper {
                        inner: $typename::new(BuddyAllocator::new(config)?),
                    })
                }

                /// Returns a reference to the inner wrapper.
                pub fn inner(&self) -> &$typename<BuddyAllocator> {
                    &self.inner
                }

                /// Allocates a block of at least `size` bytes.
                ///
                /// See [`BuddyAllocator::allocate`].
                pub fn allocate(&self, size: usize) -> Result<Block, AllocError> {
                    $method(&self.inner).allocate(size)
                }

                /// Frees the block starting at `offset`.
                ///
                /// See [`BuddyAllocator::free`].
                pub fn free(&self, offset: usize) -> Result<Block, FreeError> {
                    $method(&self.inner).free(offset)
                }

                /// Unwraps the allocator.
                pub fn into_inner(self) -> BuddyAllocator {
                    $into_inner(self.inner)
                }
            }

            impl From<BuddyAllocator> for $wrapper {
                fn from(buddy: BuddyAllocator) -> $wrapper {
                    $wrapper {
                        inner: $typename::new(buddy),
                    }
                }
            }
        )*
    };
}

declare_wrappers! {
    RefCellBuddyAllocator uses RefCell via RefCell::borrow_mut, into_inner via RefCell::into_inner
}

// Every operation leaves the allocator consistent before it can panic, so a
// poisoned lock is still usable.
#[cfg(feature = "std")]
fn lock(mutex: &Mutex<BuddyAllocator>) -> MutexGuard<'_, BuddyAllocator> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(feature = "std")]
fn unlock_into_inner(mutex: Mutex<BuddyAllocator>) -> BuddyAllocator {
    mutex.into_inner().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(feature = "std")]
declare_wrappers! {
    #[cfg_attr(docs_rs, doc(cfg(feature = "std")))]
    MutexBuddyAllocator uses Mutex via lock, into_inner via unlock_into_inner
}

/// A block handed out by a [`BuddyAllocator`].
///
/// The block covers `offset..offset + size` in the arena. `size` is the
/// power-of-two block size, which may exceed the requested size.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    offset: usize,
    size: usize,
    level: usize,
}

impl Block {
    fn at(geometry: &Geometry, level: usize, pos: usize) -> Block {
        Block {
            offset: geometry.offset_of(level, pos),
            size: geometry.block_size(level),
            level,
        }
    }

    fn from_unique(geometry: &Geometry, unique: usize) -> Block {
        let level = geometry.level_of(unique);
        Block::at(geometry, level, geometry.pos_in_level(level, unique))
    }

    /// Byte offset of the block from the start of the arena.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the block in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tree level of the block. Level 0 is the whole arena.
    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    /// The byte range covered by the block.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }
}

/// A binary-buddy allocator.
///
/// The allocator divides an arena of [`capacity`](BuddyConfig::capacity)
/// bytes into power-of-two blocks no smaller than
/// [`leaf_size`](BuddyConfig::leaf_size). Requests are rounded up to the
/// nearest block size; larger free blocks are split in half until one of the
/// right size exists, and freed blocks are merged with their buddies as soon
/// as both halves are free.
///
/// The allocator only deals in offsets. It never reads or writes the arena.
///
/// `BuddyAllocator` is not synchronized. To share one between threads, wrap
/// it in a [`MutexBuddyAllocator`] (requires the `std` feature).
///
/// ```
/// use arena_buddy::{AllocError, BuddyAllocator, BuddyConfig};
///
/// // Sixteen 64-byte leaves.
/// let config = BuddyConfig::from_capacity(1024, 64).unwrap();
/// let mut buddy = BuddyAllocator::new(config).unwrap();
///
/// let half = buddy.allocate(512).unwrap();
/// assert_eq!(half.size(), 512);
///
/// assert_eq!(
///     buddy.allocate(1024),
///     Err(AllocError::OutOfMemory { size: 1024 })
/// );
///
/// buddy.free(half.offset()).unwrap();
/// assert_eq!(buddy.allocate(1024).unwrap().offset(), 0);
/// ```
///
/// [`MutexBuddyAllocator`]: crate::MutexBuddyAllocator
pub struct BuddyAllocator {
    config: BuddyConfig,
    geometry: Geometry,
    splits: SplitTracker,
    pairs: BuddyPairTracker,
    free: FreeSet,
}

impl BuddyAllocator {
    /// Constructs a new allocator with every byte of the arena free.
    ///
    /// # Errors
    ///
    /// Returns [`AllocInitError::InvalidConfig`] if `config` fails
    /// [`BuddyConfig::validate`], or [`AllocInitError::AllocFailed`] if the
    /// split and pair bitmaps cannot be allocated.
    pub fn new(config: BuddyConfig) -> Result<BuddyAllocator, AllocInitError> {
        config.validate()?;

        let geometry = Geometry::new(&config);
        let splits = SplitTracker::new(geometry.num_internal())?;
        let pairs = BuddyPairTracker::new(geometry.num_internal())?;

        let mut free = FreeSet::new();
        free.insert(geometry.unique_index(0, 0));

        Ok(BuddyAllocator {
            config,
            geometry,
            splits,
            pairs,
            free,
        })
    }

    /// Returns the configuration the allocator was built with.
    #[inline]
    pub fn config(&self) -> &BuddyConfig {
        &self.config
    }

    /// Returns the size of the arena in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Returns the smallest block size in bytes.
    #[inline]
    pub fn leaf_size(&self) -> usize {
        self.config.leaf_size
    }

    /// Returns the number of levels in the block tree.
    #[inline]
    pub fn levels(&self) -> usize {
        self.config.max_levels
    }

    /// Removes some free block at `level` from the free set and records it as
    /// in use.
    fn take_free(&mut self, level: usize) -> Option<usize> {
        let (first, last) = self.geometry.level_range(level);
        let unique = self.free.try_take_in_range(first, last)?;

        let pos = self.geometry.pos_in_level(level, unique);
        self.pairs.toggle(self.geometry.buddy_pair_bit(level, pos));

        Some(unique)
    }

    /// Attempts to allocate a block of at least `size` bytes.
    ///
    /// A zero-sized request is treated as a request for one leaf.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OversizedRequest`] if `size` exceeds the
    /// capacity, or [`AllocError::OutOfMemory`] if no free block can hold
    /// `size` bytes. The allocator is unchanged in either case.
    pub fn allocate(&mut self, size: usize) -> Result<Block, AllocError> {
        let target_level = self
            .geometry
            .level_for_size(size)
            .ok_or(AllocError::OversizedRequest {
                size,
                capacity: self.capacity(),
            })?;

        // If there is a free block of the correct size, return it immediately.
        if let Some(unique) = self.take_free(target_level) {
            let block = Block::from_unique(&self.geometry, unique);
            log::trace!(
                "allocated {size:#x} bytes at {:#x} (level {target_level})",
                block.offset
            );
            return Ok(block);
        }

        // Otherwise, scan increasing block sizes until a free block is found.
        let Some((unique, init_level)) = (0..target_level)
            .rev()
            .find_map(|level| self.take_free(level).map(|unique| (unique, level)))
        else {
            log::debug!("out of memory allocating {size:#x} bytes");
            return Err(AllocError::OutOfMemory { size });
        };

        // Split the block repeatedly, keeping the front half each time. The
        // offset of the front half does not change.
        let mut pos = self.geometry.pos_in_level(init_level, unique);
        for level in init_level..target_level {
            self.splits.set_split(self.geometry.unique_index(level, pos), true);

            let (front, back) = (2 * pos, 2 * pos + 1);

            // The front half is in use and the back half is free.
            self.pairs.toggle(self.geometry.buddy_pair_bit(level + 1, front));
            self.free.insert(self.geometry.unique_index(level + 1, back));

            pos = front;
        }

        let block = Block::at(&self.geometry, target_level, pos);
        log::trace!(
            "allocated {size:#x} bytes at {:#x} (level {target_level}, split from level {init_level})",
            block.offset
        );

        Ok(block)
    }

    /// Allocates a block large enough to hold `data`.
    ///
    /// The allocator does not read `data`; copying it to the returned offset
    /// is the caller's job.
    ///
    /// # Errors
    ///
    /// See [`allocate`](Self::allocate).
    pub fn allocate_for(&mut self, data: &[u8]) -> Result<Block, AllocError> {
        self.allocate(data.len())
    }

    /// Finds the block that currently owns `offset`.
    ///
    /// Walks down from the root following split flags. The first unsplit
    /// node on the path is either allocated or free.
    fn owning_block(&self, offset: usize) -> Result<(usize, usize), FreeError> {
        if offset >= self.capacity() {
            return Err(FreeError::OutOfBounds {
                offset,
                capacity: self.capacity(),
            });
        }

        // Leaves are never split, so this stops at the leaf level at the
        // latest.
        let mut level = 0;
        let pos = loop {
            let pos = self.geometry.pos_in_level_for_offset(level, offset);
            if !self.splits.is_split(self.geometry.unique_index(level, pos)) {
                break pos;
            }

            level += 1;
        };

        if self.geometry.offset_of(level, pos) != offset {
            return Err(FreeError::Misaligned { offset });
        }

        if self.free.contains(self.geometry.unique_index(level, pos)) {
            return Err(FreeError::NotAllocated { offset });
        }

        Ok((level, pos))
    }

    /// Frees the block starting at `offset`, merging it with its buddies as
    /// far up the tree as possible.
    ///
    /// Returns the block that was freed, before any merging.
    ///
    /// # Errors
    ///
    /// Returns an error if `offset` is not the start of a live allocation.
    /// The allocator is unchanged in that case.
    pub fn free(&mut self, offset: usize) -> Result<Block, FreeError> {
        let (at_level, at_pos) = self.owning_block(offset).inspect_err(|e| {
            log::debug!("rejected free: {e}");
        })?;

        let (mut level, mut pos) = (at_level, at_pos);
        loop {
            let both_free = self.pairs.toggle(self.geometry.buddy_pair_bit(level, pos));

            if !both_free || level == 0 {
                let unique = self.geometry.unique_index(level, pos);
                self.splits.set_split(unique, false);
                self.free.insert(unique);
                break;
            }

            // Remove the buddy from the free set and merge into the parent.
            let buddy = self.geometry.unique_index(level, pos ^ 1);
            let removed = self.free.remove(buddy);
            debug_assert!(removed, "missing buddy {buddy} in free set");

            level -= 1;
            pos /= 2;
            self.splits.set_split(self.geometry.unique_index(level, pos), false);
        }

        log::trace!("freed {offset:#x} (level {at_level}, coalesced to level {level})");

        Ok(Block::at(&self.geometry, at_level, at_pos))
    }

    /// Frees every live allocation at once.
    pub fn reset(&mut self) {
        self.splits.clear();
        self.pairs.clear();
        self.free.clear();
        self.free.insert(self.geometry.unique_index(0, 0));
    }

    /// Returns `true` if there are no live allocations.
    pub fn is_empty(&self) -> bool {
        let empty = self.free.len() == 1 && self.free.contains(self.geometry.unique_index(0, 0));
        debug_assert!(!empty || self.splits.is_clear(), "unmerged split flags");

        empty
    }

    /// Returns the free blocks in breadth-first order: larger blocks first,
    /// lower offsets first within a size.
    pub fn free_blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.free.iter().map(|unique| Block::from_unique(&self.geometry, unique))
    }

    /// Returns the number of bytes in free blocks.
    pub fn free_bytes(&self) -> usize {
        self.free_blocks().map(|block| block.size).sum()
    }

    /// Returns the number of bytes in allocated blocks, including the
    /// rounding of each request up to its block size.
    pub fn allocated_bytes(&self) -> usize {
        self.capacity() - self.free_bytes()
    }

    /// Returns the largest free block, if any.
    ///
    /// A request no larger than this block's size will succeed.
    pub fn largest_free_block(&self) -> Option<Block> {
        self.free_blocks().next()
    }
}

impl fmt::Debug for BuddyAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuddyAllocator")
            .field("config", &self.config)
            .field("free_bytes", &self.free_bytes())
            .field("free_blocks", &self.free.len())
            .finish_non_exhaustive()
    }
}
