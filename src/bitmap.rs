use alloc::vec::Vec;
use core::mem;

use crate::AllocInitError;

/// A fixed-length array of bits packed into `u64` blocks.
pub struct Bitmap {
    num_bits: usize,
    map: Vec<u64>,
}

impl Bitmap {
    /// Constructs a new bitmap of `num_bits` bits, all cleared.
    ///
    /// Returns [`AllocInitError::AllocFailed`] if the backing storage cannot
    /// be allocated.
    pub fn new(num_bits: usize) -> Result<Bitmap, AllocInitError> {
        let num_blocks = Self::num_blocks(num_bits);

        let mut map: Vec<u64> = Vec::new();
        map.try_reserve_exact(num_blocks)
            .map_err(|_| AllocInitError::AllocFailed {
                bytes: num_blocks.saturating_mul(mem::size_of::<u64>()),
            })?;
        map.resize(num_blocks, 0);

        Ok(Bitmap { num_bits, map })
    }

    /// Returns the number of `u64` blocks needed to hold `num_bits` bits.
    #[inline]
    pub const fn num_blocks(num_bits: usize) -> usize {
        num_bits.div_ceil(u64::BITS as usize)
    }

    /// Returns the number of bits in the bitmap.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_bits
    }

    /// Returns a tuple of the index of the `u64` containing `bit` and a mask
    /// which extracts it.
    #[inline]
    const fn index_and_mask(bit: usize) -> (usize, u64) {
        (
            bit / u64::BITS as usize,
            1 << (bit as u64 % u64::BITS as u64),
        )
    }

    /// Gets the value of the indexed bit.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.num_bits);

        let (block_idx, mask) = Self::index_and_mask(index);
        self.map[block_idx] & mask != 0
    }

    /// Sets the value of the indexed bit.
    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < self.num_bits);

        let (block_idx, mask) = Self::index_and_mask(index);
        let block = &mut self.map[block_idx];
        *block = match value {
            true => *block | mask,
            false => *block & !mask,
        };
    }

    /// Toggles the value of the indexed bit and returns its new value.
    #[inline]
    pub fn toggle(&mut self, index: usize) -> bool {
        assert!(index < self.num_bits);

        let (block_idx, mask) = Self::index_and_mask(index);
        self.map[block_idx] ^= mask;
        self.map[block_idx] & mask != 0
    }

    /// Returns `true` if no bit is set.
    pub fn is_clear(&self) -> bool {
        self.map.iter().all(|&block| block == 0)
    }

    /// Clears every bit.
    pub fn clear(&mut self) {
        self.map.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_many() {
        for num_bits in 0..=256 {
            let bitmap = Bitmap::new(num_bits).unwrap();
            assert_eq!(bitmap.len(), num_bits);
            assert!(bitmap.is_clear());
            assert_eq!(bitmap.map.len(), Bitmap::num_blocks(num_bits));
        }
    }

    #[test]
    fn set_get_across_block_boundary() {
        let mut bitmap = Bitmap::new(130).unwrap();

        for bit in [0, 63, 64, 127, 128, 129] {
            bitmap.set(bit, true);
            assert!(bitmap.get(bit));
        }

        assert!(!bitmap.get(1));
        assert!(!bitmap.get(65));

        bitmap.set(64, false);
        assert!(!bitmap.get(64));
        assert!(bitmap.get(63));
    }

    #[test]
    fn toggle_returns_new_value() {
        let mut bitmap = Bitmap::new(8).unwrap();

        assert!(bitmap.toggle(3));
        assert!(bitmap.get(3));
        assert!(!bitmap.toggle(3));
        assert!(bitmap.is_clear());
    }

    #[test]
    fn clear_resets_everything() {
        let mut bitmap = Bitmap::new(200).unwrap();
        for bit in (0..200).step_by(7) {
            bitmap.set(bit, true);
        }

        assert!(!bitmap.is_clear());
        bitmap.clear();
        assert!(bitmap.is_clear());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    #[cfg_attr(miri, ignore)]
    fn unallocatable_storage_is_an_error() {
        let blocks = Bitmap::num_blocks(usize::MAX);
        assert_eq!(
            Bitmap::new(usize::MAX).err(),
            Some(AllocInitError::AllocFailed { bytes: blocks * 8 })
        );
    }

    #[test]
    #[should_panic]
    fn out_of_range_panics() {
        let bitmap = Bitmap::new(10).unwrap();
        bitmap.get(10);
    }
}
