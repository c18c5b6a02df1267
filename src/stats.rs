//! Usage statistics for a registry.

/// Registry usage statistics, as returned by [`BuddyRegistry::stats`].
///
/// [`BuddyRegistry::stats`]: crate::BuddyRegistry::stats
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// The capacity of the arena.
    pub total_bytes: usize,
    /// The combined size of all free blocks.
    pub free_bytes: usize,
    /// The combined size of all allocated blocks.
    pub used_bytes: usize,
    /// The number of free blocks.
    pub free_blocks: usize,
    /// The number of allocated blocks.
    pub used_blocks: usize,
    /// The size of the largest free block, if any block is free.
    pub largest_free_block: Option<usize>,
}

impl RegistryStats {
    /// Adds the statistics of `other` to `self`.
    ///
    /// This is useful when aggregating over several registries, e.g. one per
    /// memory zone.
    pub fn add(&mut self, other: &RegistryStats) {
        self.total_bytes += other.total_bytes;
        self.free_bytes += other.free_bytes;
        self.used_bytes += other.used_bytes;
        self.free_blocks += other.free_blocks;
        self.used_blocks += other.used_blocks;
        self.largest_free_block = match (self.largest_free_block, other.largest_free_block) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}
