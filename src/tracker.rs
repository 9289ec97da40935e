//! Per-node split flags and per-pair occupancy parity.

use crate::{bitmap::Bitmap, AllocInitError};

/// Records which internal nodes are subdivided into two children.
///
/// Indexed by unique index. Leaves are never split, so indices at or beyond
/// the leaf range read as unsplit and writes to them are ignored.
pub struct SplitTracker {
    splits: Bitmap,
}

impl SplitTracker {
    pub fn new(num_internal: usize) -> Result<SplitTracker, AllocInitError> {
        Ok(SplitTracker {
            splits: Bitmap::new(num_internal)?,
        })
    }

    #[inline]
    pub fn is_split(&self, unique: usize) -> bool {
        unique < self.splits.len() && self.splits.get(unique)
    }

    #[inline]
    pub fn set_split(&mut self, unique: usize, split: bool) {
        if unique < self.splits.len() {
            self.splits.set(unique, split);
        }
    }

    /// Returns `true` if no node is split.
    pub fn is_clear(&self) -> bool {
        self.splits.is_clear()
    }

    pub fn clear(&mut self) {
        self.splits.clear();
    }
}

/// One bit per sibling pair, toggled whenever either sibling changes
/// occupancy.
///
/// A set bit means exactly one of the pair is in use. Allocations and frees
/// each toggle the bit once, so after a free toggles it back to clear, the
/// other sibling must be free as well.
pub struct BuddyPairTracker {
    pairs: Bitmap,
}

impl BuddyPairTracker {
    /// Creates a tracker for `num_pairs` pair bits plus the root's sentinel.
    pub fn new(num_pairs: usize) -> Result<BuddyPairTracker, AllocInitError> {
        Ok(BuddyPairTracker {
            pairs: Bitmap::new(num_pairs + 1)?,
        })
    }

    /// Flips the pair bit and returns `true` if the pair is balanced
    /// afterwards.
    ///
    /// When the toggle records a free, a balanced pair means both siblings
    /// are free.
    #[inline]
    pub fn toggle(&mut self, pair_bit: usize) -> bool {
        !self.pairs.toggle(pair_bit)
    }

    /// Returns `true` if exactly one sibling of the pair is in use.
    #[cfg(test)]
    pub fn is_unbalanced(&self, pair_bit: usize) -> bool {
        self.pairs.get(pair_bit)
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_are_never_split() {
        // Three internal nodes: a tree of three levels.
        let mut splits = SplitTracker::new(3).unwrap();

        splits.set_split(1, true);
        assert!(splits.is_split(1));
        assert!(!splits.is_split(0));

        splits.set_split(3, true);
        splits.set_split(100, true);
        assert!(!splits.is_split(3));
        assert!(!splits.is_split(100));

        splits.set_split(1, false);
        assert!(splits.is_clear());
    }

    #[test]
    fn second_toggle_reports_both_free() {
        let mut pairs = BuddyPairTracker::new(3).unwrap();

        // One sibling allocated.
        assert!(!pairs.toggle(2));
        assert!(pairs.is_unbalanced(2));

        // Other sibling allocated.
        assert!(pairs.toggle(2));

        // First one freed: the pair is unbalanced again.
        assert!(!pairs.toggle(2));

        // Second one freed: both free.
        assert!(pairs.toggle(2));
        assert!(!pairs.is_unbalanced(2));
    }

    #[test]
    fn root_sentinel_is_in_range() {
        let mut pairs = BuddyPairTracker::new(0).unwrap();
        assert!(!pairs.toggle(0));
        assert!(pairs.toggle(0));
    }
}
