//! Arithmetic over the implicit block tree.
//!
//! A block is named either by `(level, pos)`, its level and its position
//! within that level, or by its unique index, its breadth-first position in
//! the tree: `unique = 2^level + pos - 1`. The root is unique index 0.

use crate::BuddyConfig;

#[derive(Copy, Clone, Debug)]
pub struct Geometry {
    capacity: usize,
    leaf_size: usize,
    levels: usize,
}

impl Geometry {
    /// Builds the geometry of an already-validated configuration.
    pub fn new(config: &BuddyConfig) -> Geometry {
        Geometry {
            capacity: config.capacity,
            leaf_size: config.leaf_size,
            levels: config.max_levels,
        }
    }

    #[inline]
    pub fn leaf_level(&self) -> usize {
        self.levels - 1
    }

    /// Number of nodes above the leaf level. These are the only nodes that
    /// can be split.
    #[inline]
    pub fn num_internal(&self) -> usize {
        (1 << self.leaf_level()) - 1
    }

    /// Size in bytes of each block at `level`.
    #[inline]
    pub fn block_size(&self, level: usize) -> usize {
        self.capacity >> level
    }

    /// Returns the deepest level whose blocks hold `size` bytes, or `None` if
    /// `size` exceeds the capacity.
    ///
    /// Requests smaller than a leaf map to the leaf level.
    pub fn level_for_size(&self, size: usize) -> Option<usize> {
        if size > self.capacity {
            return None;
        }

        let alloc_size = size.next_power_of_two().max(self.leaf_size);
        let level = self.capacity.trailing_zeros() - alloc_size.trailing_zeros();

        Some(level as usize)
    }

    /// Maps `(level, pos)` to a unique index.
    #[inline]
    pub fn unique_index(&self, level: usize, pos: usize) -> usize {
        debug_assert!(level < self.levels);
        debug_assert!(pos < 1 << level);

        (1 << level) + pos - 1
    }

    /// Recovers the position within `level` of a unique index.
    #[inline]
    pub fn pos_in_level(&self, level: usize, unique: usize) -> usize {
        debug_assert!(unique + 1 >= 1 << level);

        unique + 1 - (1 << level)
    }

    /// Returns the level a unique index belongs to.
    #[inline]
    pub fn level_of(&self, unique: usize) -> usize {
        (unique + 1).ilog2() as usize
    }

    /// Returns the contiguous range of unique indices at `level`.
    #[inline]
    pub fn level_range(&self, level: usize) -> (usize, usize) {
        (
            self.unique_index(level, 0),
            self.unique_index(level, (1 << level) - 1),
        )
    }

    /// Byte offset of the block at `(level, pos)`.
    #[inline]
    pub fn offset_of(&self, level: usize, pos: usize) -> usize {
        pos * self.block_size(level)
    }

    /// Position within `level` of the block containing `offset`.
    #[inline]
    pub fn pos_in_level_for_offset(&self, level: usize, offset: usize) -> usize {
        offset / self.block_size(level)
    }

    /// Index of the buddy-pair bit shared by the block at `(level, pos)` and
    /// its sibling.
    ///
    /// A sibling pair is keyed by its parent's unique index, so pair bits
    /// occupy `0..num_internal()`. The root has no sibling and maps to the
    /// sentinel bit `num_internal()`.
    #[inline]
    pub fn buddy_pair_bit(&self, level: usize, pos: usize) -> usize {
        match level {
            0 => self.num_internal(),
            _ => self.unique_index(level - 1, pos / 2),
        }
    }
}
