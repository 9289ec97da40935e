//! Allocator configuration parameters.

use crate::ConfigError;

/// Configuration for a [`BuddyAllocator`].
///
/// The three fields are not independent: `capacity` must equal
/// `leaf_size << (max_levels - 1)`. Use [`BuddyConfig::new`] or
/// [`BuddyConfig::from_capacity`] to derive the third from the other two.
/// The configuration is validated when the allocator is constructed and is
/// immutable afterwards.
///
/// [`BuddyAllocator`]: crate::BuddyAllocator
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BuddyConfig {
    /// Total size of the arena in bytes.
    ///
    /// Default: 65536.
    pub capacity: usize,

    /// Size of the smallest allocatable block in bytes.
    ///
    /// Default: 4096. Must be a nonzero power of two.
    pub leaf_size: usize,

    /// Number of levels in the block tree, counting the root and the leaves.
    ///
    /// Default: 5. Level 0 is the whole arena and level `max_levels - 1`
    /// holds leaf-sized blocks.
    pub max_levels: usize,
}

impl BuddyConfig {
    /// Default leaf size: one 4KiB page.
    pub const DEFAULT_LEAF_SIZE: usize = 4096;

    /// Default number of levels.
    pub const DEFAULT_MAX_LEVELS: usize = 5;

    /// Largest accepted number of levels.
    ///
    /// Split and pair metadata take one bit per internal node, so a tree of
    /// this depth needs 256MiB of each.
    pub const MAX_LEVELS: usize = 32;

    /// Creates a configuration from a leaf size and a level count.
    ///
    /// The capacity is `leaf_size << (max_levels - 1)`. If that overflows, the
    /// capacity is set to zero and [`validate`](Self::validate) reports the
    /// problem.
    pub fn new(leaf_size: usize, max_levels: usize) -> BuddyConfig {
        BuddyConfig {
            capacity: Self::implied_capacity(leaf_size, max_levels).unwrap_or(0),
            leaf_size,
            max_levels,
        }
    }

    /// Creates a configuration from a capacity and a leaf size.
    ///
    /// # Errors
    ///
    /// Returns an error if `leaf_size` is not a power of two or `capacity` is
    /// not a power-of-two multiple of it.
    pub fn from_capacity(capacity: usize, leaf_size: usize) -> Result<BuddyConfig, ConfigError> {
        if !leaf_size.is_power_of_two() {
            return Err(ConfigError::LeafSizeNotPowerOfTwo(leaf_size));
        }

        let ratio = capacity / leaf_size;
        if capacity % leaf_size != 0 || !ratio.is_power_of_two() {
            return Err(ConfigError::CapacityNotPowerOfTwoMultiple {
                capacity,
                leaf_size,
            });
        }

        let config = BuddyConfig {
            capacity,
            leaf_size,
            max_levels: ratio.trailing_zeros() as usize + 1,
        };
        config.validate()?;

        Ok(config)
    }

    /// Checks that the configuration describes a buildable tree.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.leaf_size.is_power_of_two() {
            return Err(ConfigError::LeafSizeNotPowerOfTwo(self.leaf_size));
        }

        if self.max_levels == 0 {
            return Err(ConfigError::ZeroLevels);
        }

        if self.max_levels > Self::MAX_LEVELS {
            return Err(ConfigError::TooManyLevels(self.max_levels));
        }

        let expected = Self::implied_capacity(self.leaf_size, self.max_levels)
            .ok_or(ConfigError::TooManyLevels(self.max_levels))?;

        if expected != self.capacity {
            return Err(ConfigError::CapacityMismatch {
                expected,
                actual: self.capacity,
            });
        }

        Ok(())
    }

    fn implied_capacity(leaf_size: usize, max_levels: usize) -> Option<usize> {
        // One node index per tree node must also fit, hence the strict bound.
        let shift: u32 = max_levels.checked_sub(1)?.try_into().ok()?;
        if shift >= usize::BITS - 1 {
            return None;
        }

        leaf_size.checked_mul(1 << shift)
    }
}

impl Default for BuddyConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEAF_SIZE, Self::DEFAULT_MAX_LEVELS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_64k_in_4k_leaves() {
        let config = BuddyConfig::default();
        assert_eq!(config.capacity, 65536);
        assert_eq!(config.leaf_size, 4096);
        assert_eq!(config.max_levels, 5);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn from_capacity_derives_levels() {
        let config = BuddyConfig::from_capacity(65536, 4096).unwrap();
        assert_eq!(config, BuddyConfig::default());

        let single = BuddyConfig::from_capacity(4096, 4096).unwrap();
        assert_eq!(single.max_levels, 1);
    }

    #[test]
    fn from_capacity_rejects_bad_ratios() {
        assert_eq!(
            BuddyConfig::from_capacity(3 * 4096, 4096),
            Err(ConfigError::CapacityNotPowerOfTwoMultiple {
                capacity: 3 * 4096,
                leaf_size: 4096
            })
        );
        assert!(BuddyConfig::from_capacity(1000, 64).is_err());
        assert!(BuddyConfig::from_capacity(0, 64).is_err());
        assert_eq!(
            BuddyConfig::from_capacity(4096, 48),
            Err(ConfigError::LeafSizeNotPowerOfTwo(48))
        );
    }

    #[test]
    fn validate_catches_each_field() {
        let bad_leaf = BuddyConfig {
            leaf_size: 0,
            ..BuddyConfig::default()
        };
        assert_eq!(
            bad_leaf.validate(),
            Err(ConfigError::LeafSizeNotPowerOfTwo(0))
        );

        let no_levels = BuddyConfig {
            max_levels: 0,
            ..BuddyConfig::default()
        };
        assert_eq!(no_levels.validate(), Err(ConfigError::ZeroLevels));

        let mismatch = BuddyConfig {
            capacity: 32768,
            ..BuddyConfig::default()
        };
        assert_eq!(
            mismatch.validate(),
            Err(ConfigError::CapacityMismatch {
                expected: 65536,
                actual: 32768
            })
        );
    }

    #[test]
    fn levels_beyond_the_maximum_are_rejected() {
        let config = BuddyConfig::new(1, 50);
        assert_eq!(config.validate(), Err(ConfigError::TooManyLevels(50)));

        let too_deep = BuddyConfig::new(1, BuddyConfig::MAX_LEVELS + 1);
        assert_eq!(
            too_deep.validate(),
            Err(ConfigError::TooManyLevels(BuddyConfig::MAX_LEVELS + 1))
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn maximum_depth_is_accepted() {
        let config = BuddyConfig::new(1, BuddyConfig::MAX_LEVELS);
        assert_eq!(config.capacity, 1 << 31);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn overflowing_levels_are_rejected() {
        let config = BuddyConfig::new(4096, usize::BITS as usize);
        assert_eq!(config.capacity, 0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooManyLevels(usize::BITS as usize))
        );
    }
}
