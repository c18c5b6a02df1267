use std::ops::Range;

use alloc_hater::Subject;
use buddy_registry::{AllocError, AllocInitError, BuddyRegistry, DeallocError};

pub struct RegistrySubject(BuddyRegistry);

impl RegistrySubject {
    pub fn new(total_memory: usize) -> Result<Self, AllocInitError> {
        let r = BuddyRegistry::new(total_memory)?;
        Ok(RegistrySubject(r))
    }

    pub fn with_min_block_size(
        total_memory: usize,
        min_block_size: usize,
    ) -> Result<Self, AllocInitError> {
        let r = BuddyRegistry::with_min_block_size(total_memory, min_block_size)?;
        Ok(RegistrySubject(r))
    }

    pub fn registry(&self) -> &BuddyRegistry {
        &self.0
    }

    pub fn registry_mut(&mut self) -> &mut BuddyRegistry {
        &mut self.0
    }
}

impl Subject for RegistrySubject {
    type AllocError = AllocError;
    type DeallocError = DeallocError;

    fn capacity(&self) -> usize {
        self.0.total_memory()
    }

    fn allocate(&mut self, size: usize) -> Result<Range<usize>, AllocError> {
        let block_size = self.0.block_size_for(size)?;
        let addr = self.0.allocate(size)?;
        Ok(addr..addr + block_size)
    }

    fn deallocate(&mut self, block: Range<usize>, size: usize) -> Result<(), DeallocError> {
        self.0.deallocate(block.start, size)
    }
}
