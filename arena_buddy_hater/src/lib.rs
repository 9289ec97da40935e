use std::ops::Range;

use arena_buddy::{AllocError, AllocInitError, BuddyAllocator, BuddyConfig, FreeError};
use arena_hater::Subject;

pub struct BuddySubject(BuddyAllocator);

impl BuddySubject {
    pub fn new(config: BuddyConfig) -> Result<Self, AllocInitError> {
        let b = BuddyAllocator::new(config)?;
        Ok(BuddySubject(b))
    }

    pub fn allocator(&self) -> &BuddyAllocator {
        &self.0
    }
}

impl Subject for BuddySubject {
    type AllocError = AllocError;
    type FreeError = FreeError;

    fn capacity(&self) -> usize {
        self.0.capacity()
    }

    fn allocate(&mut self, size: usize) -> Result<Range<usize>, Self::AllocError> {
        self.0.allocate(size).map(|block| block.range())
    }

    fn free(&mut self, offset: usize) -> Result<(), Self::FreeError> {
        self.0.free(offset).map(drop)
    }
}
