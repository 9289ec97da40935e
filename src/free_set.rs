//! The set of blocks available for allocation.

use alloc::collections::BTreeSet;

/// Ordered set of free blocks, keyed by unique index.
///
/// Because the unique indices of each level form a contiguous range, a level
/// query is a range query.
#[derive(Default)]
pub struct FreeSet {
    free: BTreeSet<usize>,
}

impl FreeSet {
    pub fn new() -> FreeSet {
        FreeSet::default()
    }

    #[inline]
    pub fn insert(&mut self, unique: usize) {
        let inserted = self.free.insert(unique);
        debug_assert!(inserted, "block {unique} inserted into free set twice");
    }

    #[inline]
    pub fn remove(&mut self, unique: usize) -> bool {
        self.free.remove(&unique)
    }

    #[inline]
    pub fn contains(&self, unique: usize) -> bool {
        self.free.contains(&unique)
    }

    /// Removes and returns some free block whose unique index lies in
    /// `first..=last`.
    ///
    /// The lowest such index is chosen.
    pub fn try_take_in_range(&mut self, first: usize, last: usize) -> Option<usize> {
        let unique = *self.free.range(first..=last).next()?;
        self.free.remove(&unique);

        Some(unique)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.free.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn clear(&mut self) {
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn take_respects_range() {
        let mut set = FreeSet::new();
        set.insert(2);
        set.insert(5);
        set.insert(9);

        assert_eq!(set.try_take_in_range(3, 6), Some(5));
        assert_eq!(set.try_take_in_range(3, 6), None);
        assert_eq!(set.try_take_in_range(7, 14), Some(9));
        assert_eq!(set.iter().collect::<Vec<_>>(), [2]);
    }

    #[test]
    fn take_is_inclusive_at_both_ends() {
        let mut set = FreeSet::new();
        set.insert(3);
        set.insert(6);

        assert_eq!(set.try_take_in_range(3, 6), Some(3));
        assert_eq!(set.try_take_in_range(3, 6), Some(6));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn remove_reports_membership() {
        let mut set = FreeSet::new();
        set.insert(0);

        assert!(set.contains(0));
        assert!(set.remove(0));
        assert!(!set.remove(0));
        assert!(!set.contains(0));
    }
}
