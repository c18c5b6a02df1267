//! A binary-buddy registry over an abstract address space.
//!
//! The registry manages the address range `[0, total_memory)`, where
//! `total_memory` is a power of two. Every block it hands out is a power of two
//! in size and is aligned to its own size.
//!
//! ## Characteristics
//!
//! #### Time complexity
//!
//! With `n` outstanding allocations and `L = log2(total_memory)` size classes:
//!
//! | Operation                | Best-case | Worst-case     |
//! |--------------------------|-----------|----------------|
//! | Allocate                 | O(log n)  | O(L log n)     |
//! | Deallocate               | O(log n)  | O(L log n)     |
//!
//! #### Fragmentation
//!
//! Requests are rounded up to the next power of two, so up to half of each
//! block may be lost to internal fragmentation. Freed blocks are eagerly
//! coalesced with their buddies, which bounds external fragmentation.

use alloc::collections::{BTreeMap, BTreeSet};
use core::cell::{RefCell, RefMut};
use core::ops::DerefMut;

use log::{debug, trace, warn};

#[cfg(feature = "std")]
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    size_class::{buddy_of, is_aligned, parent_of, round_up_pow2},
    AllocError, AllocInitError, DeallocError, RegistryStats, Snapshot,
};

/// The free lists of a registry, one per size class.
///
/// Size classes with no free blocks have no entry, so the first entry at or
/// above a given size is always the best fit.
#[derive(Clone, Debug, Default)]
struct FreeLists {
    classes: BTreeMap<usize, BTreeSet<usize>>,
}

impl FreeLists {
    /// Pushes a block onto the free list of its size class.
    fn push(&mut self, size: usize, block: usize) {
        debug_assert!(is_aligned(block, size));

        let inserted = self.classes.entry(size).or_default().insert(block);
        debug_assert!(inserted, "block {block:#x} already free at size {size}");
    }

    /// Removes the specified block from the free list of its size class.
    ///
    /// Returns `false` if the block was not free.
    fn remove(&mut self, size: usize, block: usize) -> bool {
        let Some(free) = self.classes.get_mut(&size) else {
            return false;
        };

        let removed = free.remove(&block);
        if free.is_empty() {
            self.classes.remove(&size);
        }

        removed
    }

    /// Returns the smallest size class of at least `min_size` that has a free
    /// block.
    fn best_fit(&self, min_size: usize) -> Option<usize> {
        self.classes.range(min_size..).next().map(|(&size, _)| size)
    }

    /// Pops the lowest-addressed block from the free list of `size`.
    fn pop_lowest(&mut self, size: usize) -> Option<usize> {
        let free = self.classes.get_mut(&size)?;
        let block = free.pop_first();

        if free.is_empty() {
            self.classes.remove(&size);
        }

        block
    }

    fn iter(&self) -> impl Iterator<Item = (usize, &BTreeSet<usize>)> + '_ {
        self.classes.iter().map(|(&size, free)| (size, free))
    }
}

/// A binary-buddy allocator over the address range `[0, total_memory)`.
///
/// The registry starts with a single free block spanning the whole range.
/// [`allocate`](Self::allocate) picks the smallest free block that fits,
/// splitting it in half as often as needed, and
/// [`deallocate`](Self::deallocate) merges freed blocks with their buddies.
///
/// Every outstanding allocation is recorded, so deallocations of unknown
/// addresses, double frees and mismatched sizes are rejected instead of
/// corrupting the free lists.
///
/// ```
/// use buddy_registry::{AllocError, BuddyRegistry};
///
/// let mut registry = BuddyRegistry::new(128).unwrap();
/// assert_eq!(registry.allocate(20), Ok(0));
/// assert_eq!(registry.allocate(200), Err(AllocError::SizeExceedsCapacity));
/// ```
#[derive(Clone, Debug)]
pub struct BuddyRegistry {
    total_memory: usize,
    min_block_size: usize,
    free_lists: FreeLists,
    /// Maps the address of each outstanding allocation to its block size.
    allocated: BTreeMap<usize, usize>,
}

impl BuddyRegistry {
    /// Constructs a registry managing `total_memory` addresses.
    ///
    /// # Errors
    ///
    /// Returns [`AllocInitError::InvalidConfig`] if `total_memory` is not a
    /// nonzero power of two.
    pub fn new(total_memory: usize) -> Result<BuddyRegistry, AllocInitError> {
        BuddyRegistry::with_min_block_size(total_memory, 1)
    }

    /// Constructs a registry managing `total_memory` addresses, in which no
    /// block is smaller than `min_block_size`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocInitError::InvalidConfig`] if `total_memory` is not a
    /// nonzero power of two, or if `min_block_size` is not a power of two no
    /// larger than `total_memory`.
    pub fn with_min_block_size(
        total_memory: usize,
        min_block_size: usize,
    ) -> Result<BuddyRegistry, AllocInitError> {
        if !total_memory.is_power_of_two()
            || !min_block_size.is_power_of_two()
            || min_block_size > total_memory
        {
            return Err(AllocInitError::InvalidConfig);
        }

        let mut free_lists = FreeLists::default();
        free_lists.push(total_memory, 0);

        debug!("buddy registry: {total_memory} addresses, min block size {min_block_size}");

        Ok(BuddyRegistry {
            total_memory,
            min_block_size,
            free_lists,
            allocated: BTreeMap::new(),
        })
    }

    /// Returns the capacity of the arena.
    #[inline]
    pub fn total_memory(&self) -> usize {
        self.total_memory
    }

    /// Returns the smallest block size this registry hands out.
    #[inline]
    pub fn min_block_size(&self) -> usize {
        self.min_block_size
    }

    /// Rounds `size` up to a block size, or `None` if no block could hold it.
    fn round_block_size(&self, size: usize) -> Option<usize> {
        let size = round_up_pow2(size)?.max(self.min_block_size);
        (size <= self.total_memory).then_some(size)
    }

    /// Returns the size of the block that [`allocate`](Self::allocate) would
    /// reserve for a request of `request_size`.
    ///
    /// # Errors
    ///
    /// Returns the same size errors as `allocate`: [`AllocError::ZeroSize`]
    /// or [`AllocError::SizeExceedsCapacity`].
    pub fn block_size_for(&self, request_size: usize) -> Result<usize, AllocError> {
        if request_size == 0 {
            return Err(AllocError::ZeroSize);
        }

        self.round_block_size(request_size)
            .ok_or(AllocError::SizeExceedsCapacity)
    }

    /// Attempts to allocate a block of at least `request_size` addresses.
    ///
    /// On success, returns the start address of the block. The block size is
    /// `request_size` rounded up to a power of two (and to at least the
    /// minimum block size), and the address is a multiple of it.
    ///
    /// Among the free blocks large enough to hold the request, the smallest
    /// size class wins, and within it the lowest address.
    ///
    /// # Errors
    ///
    /// - [`AllocError::ZeroSize`] if `request_size` is zero.
    /// - [`AllocError::SizeExceedsCapacity`] if the rounded size is larger
    ///   than the arena.
    /// - [`AllocError::OutOfMemory`] if no free block is large enough.
    ///
    /// The registry is unchanged on error.
    pub fn allocate(&mut self, request_size: usize) -> Result<usize, AllocError> {
        let block_size = self.block_size_for(request_size)?;

        let Some(found_size) = self.free_lists.best_fit(block_size) else {
            debug!("allocate({request_size}): no free block of size {block_size} or larger");
            return Err(AllocError::OutOfMemory);
        };

        let block = self
            .free_lists
            .pop_lowest(found_size)
            .ok_or(AllocError::OutOfMemory)?;

        // Split the block repeatedly to obtain a suitably sized block. The
        // address of the front half does not change.
        let mut size = found_size;
        while size > block_size {
            size /= 2;
            let back_half = block + size;

            trace!("split {block:#x}/{}: freeing {back_half:#x}/{size}", size * 2);
            self.free_lists.push(size, back_half);
        }

        self.allocated.insert(block, block_size);

        debug!("allocate({request_size}): {block:#x}/{block_size}");
        Ok(block)
    }

    /// Deallocates the block at `address`, which was allocated with
    /// `block_size`.
    ///
    /// `block_size` may be either the original request size or the block
    /// size it was rounded to. The freed block is coalesced with its buddy as
    /// long as the buddy is free, up to the size of the arena.
    ///
    /// # Errors
    ///
    /// - [`DeallocError::InvalidBlockSize`] if `block_size` is zero or rounds
    ///   to more than the arena.
    /// - [`DeallocError::UnknownOrMismatchedBlock`] if `address` is not an
    ///   outstanding allocation of that size. This includes double frees.
    ///
    /// The registry is unchanged on error.
    pub fn deallocate(&mut self, address: usize, block_size: usize) -> Result<(), DeallocError> {
        let size = self
            .round_block_size(block_size)
            .ok_or(DeallocError::InvalidBlockSize)?;

        match self.allocated.get(&address) {
            Some(&allocated) if allocated == size => (),
            Some(&allocated) => {
                warn!(
                    "deallocate({address:#x}, {block_size}): block was allocated with size {allocated}"
                );
                return Err(DeallocError::UnknownOrMismatchedBlock);
            }
            None => {
                warn!("deallocate({address:#x}, {block_size}): no such allocated block");
                return Err(DeallocError::UnknownOrMismatchedBlock);
            }
        }

        self.allocated.remove(&address);
        self.free(address, size);

        debug!("deallocate({address:#x}, {block_size}): freed block of size {size}");
        Ok(())
    }

    /// Deallocates the block at `address`, using the block size recorded when
    /// it was allocated.
    ///
    /// On success, returns the size of the freed block.
    ///
    /// # Errors
    ///
    /// Returns [`DeallocError::UnknownOrMismatchedBlock`] if `address` is not
    /// an outstanding allocation.
    pub fn release(&mut self, address: usize) -> Result<usize, DeallocError> {
        let Some(size) = self.allocated.remove(&address) else {
            warn!("release({address:#x}): no such allocated block");
            return Err(DeallocError::UnknownOrMismatchedBlock);
        };

        self.free(address, size);

        debug!("release({address:#x}): freed block of size {size}");
        Ok(size)
    }

    /// Returns a block to the free lists, coalescing it with free buddies.
    fn free(&mut self, mut block: usize, mut size: usize) {
        while size < self.total_memory {
            let buddy = buddy_of(block, size);
            if !self.free_lists.remove(size, buddy) {
                break;
            }

            trace!("coalesce {block:#x}/{size} with buddy {buddy:#x}");
            block = parent_of(block, size);
            size *= 2;
        }

        self.free_lists.push(size, block);
    }

    /// Returns `true` if `address` is the start of an outstanding allocation.
    pub fn is_allocated(&self, address: usize) -> bool {
        self.allocated.contains_key(&address)
    }

    /// Returns the block size of the outstanding allocation at `address`.
    pub fn block_size_of(&self, address: usize) -> Option<usize> {
        self.allocated.get(&address).copied()
    }

    /// Returns the combined size of all free blocks.
    pub fn free_bytes(&self) -> usize {
        self.free_lists
            .iter()
            .map(|(size, free)| size * free.len())
            .sum()
    }

    /// Returns the combined size of all allocated blocks.
    pub fn used_bytes(&self) -> usize {
        self.allocated.values().sum()
    }

    /// Returns the free blocks of every size class.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_classes(
            self.free_lists
                .iter()
                .map(|(size, free)| (size, free.iter().copied().collect()))
                .collect(),
        )
    }

    /// Returns usage statistics for this registry.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_bytes: self.total_memory,
            free_bytes: self.free_bytes(),
            used_bytes: self.used_bytes(),
            free_blocks: self.free_lists.iter().map(|(_, free)| free.len()).sum(),
            used_blocks: self.allocated.len(),
            largest_free_block: self.free_lists.classes.keys().next_back().copied(),
        }
    }

    /// Iterates over the outstanding allocations as `(address, block size)`
    /// pairs, in ascending order of address.
    pub fn allocations(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.allocated.iter().map(|(&addr, &size)| (addr, size))
    }
}

/// A lock guarding a whole registry for the duration of one call.
trait Exclusive {
    type Guard<'a>: DerefMut<Target = BuddyRegistry>
    where
        Self: 'a;

    fn exclusive(&self) -> Self::Guard<'_>;
}

impl Exclusive for RefCell<BuddyRegistry> {
    type Guard<'a> = RefMut<'a, BuddyRegistry>;

    fn exclusive(&self) -> RefMut<'_, BuddyRegistry> {
        self.borrow_mut()
    }
}

// Registry operations validate before mutating, so a poisoned registry is
// still consistent.
#[cfg(feature = "std")]
impl Exclusive for Mutex<BuddyRegistry> {
    type Guard<'a> = MutexGuard<'a, BuddyRegistry>;

    fn exclusive(&self) -> MutexGuard<'_, BuddyRegistry> {
        self.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Declares wrappers which hold a `BuddyRegistry` behind a lock.
///
/// Each method takes the lock once and holds it for the entire operation,
/// including every split and merge step.
macro_rules! declare_wrappers {
    (@unwrap $inner:ident RefCell) => { $inner };
    (@unwrap $inner:ident Mutex) => { $inner.unwrap_or_else(PoisonError::into_inner) };

    ($($(#[$attr:meta])* $wrapper:ident uses $typename:ident)*) => {
        $(
            #[doc = concat!("A `BuddyRegistry` wrapped by a `", stringify!($typename), "`.")]
            ///
            /// Every method locks the registry once for the whole call.
            $(#[$attr])*
            #[derive(Debug)]
            pub struct $wrapper {
                inner: $typename<BuddyRegistry>,
            }

            $(#[$attr])*
            impl $wrapper {
                /// Wraps `registry`.
                pub fn new(registry: BuddyRegistry) -> $wrapper {
                    $wrapper {
                        inner: $typename::new(registry),
                    }
                }

                /// Returns a reference to the inner wrapper.
                pub fn inner(&self) -> &$typename<BuddyRegistry> {
                    &self.inner
                }

                /// Unwraps the registry.
                pub fn into_inner(self) -> BuddyRegistry {
                    let inner = self.inner.into_inner();
                    declare_wrappers!(@unwrap inner $typename)
                }

                /// See [`BuddyRegistry::allocate`].
                pub fn allocate(&self, request_size: usize) -> Result<usize, AllocError> {
                    self.inner.exclusive().allocate(request_size)
                }

                /// See [`BuddyRegistry::deallocate`].
                pub fn deallocate(&self, address: usize, block_size: usize) -> Result<(), DeallocError> {
                    self.inner.exclusive().deallocate(address, block_size)
                }

                /// See [`BuddyRegistry::release`].
                pub fn release(&self, address: usize) -> Result<usize, DeallocError> {
                    self.inner.exclusive().release(address)
                }

                /// See [`BuddyRegistry::snapshot`].
                pub fn snapshot(&self) -> Snapshot {
                    self.inner.exclusive().snapshot()
                }

                /// See [`BuddyRegistry::stats`].
                pub fn stats(&self) -> RegistryStats {
                    self.inner.exclusive().stats()
                }
            }

            $(#[$attr])*
            impl From<BuddyRegistry> for $wrapper {
                fn from(registry: BuddyRegistry) -> $wrapper {
                    $wrapper::new(registry)
                }
            }
        )*
    };

}

declare_wrappers! {
    RefCellBuddyRegistry uses RefCell
}

#[cfg(feature = "std")]
declare_wrappers! {
    #[cfg(feature = "std")]
    #[cfg_attr(docs_rs, doc(cfg(feature = "std")))]
    MutexBuddyRegistry uses Mutex
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::prelude::rust_2021::*;

    use super::*;

    fn free_map(registry: &BuddyRegistry) -> BTreeMap<usize, Vec<usize>> {
        registry.snapshot().into_map()
    }

    fn map(entries: &[(usize, &[usize])]) -> BTreeMap<usize, Vec<usize>> {
        entries
            .iter()
            .map(|&(size, addrs)| (size, addrs.to_vec()))
            .collect()
    }

    #[test]
    fn create_and_inspect() {
        let registry = BuddyRegistry::new(128).unwrap();

        assert_eq!(registry.total_memory(), 128);
        assert_eq!(registry.min_block_size(), 1);
        assert_eq!(free_map(&registry), map(&[(128, &[0])]));
        assert_eq!(registry.free_bytes(), 128);
        assert_eq!(registry.used_bytes(), 0);
    }

    #[test]
    fn rejects_invalid_config() {
        assert_eq!(BuddyRegistry::new(0).unwrap_err(), AllocInitError::InvalidConfig);
        assert_eq!(BuddyRegistry::new(100).unwrap_err(), AllocInitError::InvalidConfig);
        assert_eq!(
            BuddyRegistry::with_min_block_size(64, 128).unwrap_err(),
            AllocInitError::InvalidConfig
        );
        assert_eq!(
            BuddyRegistry::with_min_block_size(64, 3).unwrap_err(),
            AllocInitError::InvalidConfig
        );
        assert_eq!(
            BuddyRegistry::with_min_block_size(64, 0).unwrap_err(),
            AllocInitError::InvalidConfig
        );
        assert!(BuddyRegistry::new(1).is_ok());
        assert!(BuddyRegistry::new(1 << (usize::BITS - 1)).is_ok());
    }

    #[test]
    fn scenario_128() {
        let mut registry = BuddyRegistry::new(128).unwrap();

        assert_eq!(registry.allocate(20), Ok(0));
        assert_eq!(free_map(&registry), map(&[(32, &[32]), (64, &[64])]));

        assert_eq!(registry.allocate(50), Ok(64));
        assert_eq!(free_map(&registry), map(&[(32, &[32])]));

        assert_eq!(registry.allocate(10), Ok(32));
        assert_eq!(free_map(&registry), map(&[(16, &[48])]));
        let after_third = registry.snapshot();

        assert_eq!(registry.deallocate(0, 20), Ok(()));
        assert_eq!(free_map(&registry), map(&[(16, &[48]), (32, &[0])]));

        assert_eq!(registry.allocate(30), Ok(0));
        assert_eq!(registry.snapshot(), after_third);
    }

    #[test]
    fn size_exceeds_capacity_leaves_registry_unchanged() {
        let mut registry = BuddyRegistry::new(128).unwrap();
        registry.allocate(20).unwrap();
        let before = registry.snapshot();

        assert_eq!(registry.allocate(129), Err(AllocError::SizeExceedsCapacity));
        assert_eq!(registry.allocate(usize::MAX), Err(AllocError::SizeExceedsCapacity));
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn zero_size_request() {
        let mut registry = BuddyRegistry::new(128).unwrap();

        assert_eq!(registry.allocate(0), Err(AllocError::ZeroSize));
        assert_eq!(registry.block_size_for(0), Err(AllocError::ZeroSize));
        assert_eq!(free_map(&registry), map(&[(128, &[0])]));
    }

    #[test]
    fn out_of_memory_leaves_registry_unchanged() {
        let mut registry = BuddyRegistry::new(128).unwrap();
        registry.allocate(64).unwrap();
        registry.allocate(32).unwrap();
        let before = registry.snapshot();

        assert_eq!(registry.allocate(64), Err(AllocError::OutOfMemory));
        assert_eq!(registry.snapshot(), before);

        assert_eq!(registry.allocate(32), Ok(96));
        assert_eq!(registry.allocate(1), Err(AllocError::OutOfMemory));
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn best_fit_prefers_smallest_class() {
        let mut registry = BuddyRegistry::new(128).unwrap();
        let a = registry.allocate(16).unwrap();
        let b = registry.allocate(16).unwrap();
        let _c = registry.allocate(16).unwrap();

        // Leaves {16: [48], 64: [64]} plus the freed 16 at `a`.
        registry.deallocate(a, 16).unwrap();
        assert_eq!(free_map(&registry), map(&[(16, &[0, 48]), (64, &[64])]));

        // The lowest address of the smallest adequate class is chosen.
        assert_eq!(registry.allocate(9), Ok(0));
        assert_eq!(registry.allocate(16), Ok(48));
        assert_eq!(registry.allocate(16), Ok(64));

        registry.deallocate(b, 16).unwrap();
    }

    #[test]
    fn alloc_min_size() {
        let mut registry = BuddyRegistry::new(8).unwrap();

        let addrs: Vec<usize> = (0..8).map(|_| registry.allocate(1).unwrap()).collect();
        assert_eq!(addrs, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(registry.allocate(1), Err(AllocError::OutOfMemory));

        for addr in addrs {
            registry.deallocate(addr, 1).unwrap();
        }
        assert_eq!(free_map(&registry), map(&[(8, &[0])]));
    }

    #[test]
    fn coalesce_one() {
        let mut registry = BuddyRegistry::new(16).unwrap();

        // Allocate two half-size blocks to split the top block.
        let a = registry.allocate(8).unwrap();
        let b = registry.allocate(8).unwrap();

        // Free both blocks, coalescing them.
        registry.deallocate(a, 8).unwrap();
        registry.deallocate(b, 8).unwrap();

        // Allocate the entire region to ensure coalescing worked.
        let c = registry.allocate(16).unwrap();
        registry.deallocate(c, 16).unwrap();

        // Same as above, this time freeing in reverse order.
        let a = registry.allocate(8).unwrap();
        let b = registry.allocate(8).unwrap();
        registry.deallocate(b, 8).unwrap();
        registry.deallocate(a, 8).unwrap();

        assert_eq!(registry.allocate(16), Ok(0));
    }

    #[test]
    fn coalesce_many() {
        const TOTAL: usize = 1024;

        let mut registry = BuddyRegistry::new(TOTAL).unwrap();

        for shift in 0..=TOTAL.trailing_zeros() {
            let alloc_size = 1 << shift;
            let num_allocs = TOTAL / alloc_size;

            let allocs: Vec<usize> = (0..num_allocs)
                .map(|_| registry.allocate(alloc_size).unwrap())
                .collect();
            assert_eq!(registry.allocate(alloc_size), Err(AllocError::OutOfMemory));

            // Free in an interleaved order so that merges cascade late.
            let (even, odd): (Vec<usize>, Vec<usize>) =
                allocs.into_iter().partition(|&a| (a / alloc_size) % 2 == 0);
            for addr in even.into_iter().chain(odd) {
                registry.deallocate(addr, alloc_size).unwrap();
            }

            assert_eq!(free_map(&registry), map(&[(TOTAL, &[0])]));
        }
    }

    #[test]
    fn coalescing_stops_at_allocated_buddy() {
        let mut registry = BuddyRegistry::new(64).unwrap();
        let a = registry.allocate(16).unwrap();
        let b = registry.allocate(16).unwrap();
        let c = registry.allocate(16).unwrap();

        registry.deallocate(c, 16).unwrap();
        assert_eq!(free_map(&registry), map(&[(32, &[32])]));

        registry.deallocate(a, 16).unwrap();
        assert_eq!(free_map(&registry), map(&[(16, &[0]), (32, &[32])]));

        registry.deallocate(b, 16).unwrap();
        assert_eq!(free_map(&registry), map(&[(64, &[0])]));
    }

    #[test]
    fn dealloc_rejects_invalid_sizes() {
        let mut registry = BuddyRegistry::new(128).unwrap();
        let a = registry.allocate(20).unwrap();
        let before = registry.snapshot();

        assert_eq!(registry.deallocate(a, 0), Err(DeallocError::InvalidBlockSize));
        assert_eq!(registry.deallocate(a, 129), Err(DeallocError::InvalidBlockSize));
        assert_eq!(registry.deallocate(a, usize::MAX), Err(DeallocError::InvalidBlockSize));
        assert_eq!(registry.snapshot(), before);
        assert!(registry.is_allocated(a));
    }

    #[test]
    fn dealloc_rejects_mismatched_blocks() {
        let mut registry = BuddyRegistry::new(128).unwrap();
        let a = registry.allocate(20).unwrap();
        let before = registry.snapshot();

        // Wrong size class.
        assert_eq!(
            registry.deallocate(a, 64),
            Err(DeallocError::UnknownOrMismatchedBlock)
        );
        // Never allocated.
        assert_eq!(
            registry.deallocate(32, 32),
            Err(DeallocError::UnknownOrMismatchedBlock)
        );
        assert_eq!(registry.snapshot(), before);

        // Request size and block size are interchangeable.
        assert_eq!(registry.deallocate(a, 32), Ok(()));
        assert_eq!(free_map(&registry), map(&[(128, &[0])]));
    }

    #[test]
    fn double_free_is_rejected() {
        let mut registry = BuddyRegistry::new(128).unwrap();
        let a = registry.allocate(10).unwrap();
        let _b = registry.allocate(10).unwrap();

        registry.deallocate(a, 10).unwrap();
        let before = registry.snapshot();

        assert_eq!(
            registry.deallocate(a, 10),
            Err(DeallocError::UnknownOrMismatchedBlock)
        );
        assert_eq!(registry.release(a), Err(DeallocError::UnknownOrMismatchedBlock));
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn release_uses_recorded_size() {
        let mut registry = BuddyRegistry::new(128).unwrap();
        let a = registry.allocate(20).unwrap();
        let b = registry.allocate(3).unwrap();

        assert_eq!(registry.block_size_of(a), Some(32));
        assert_eq!(registry.block_size_of(b), Some(4));
        assert_eq!(registry.allocations().collect::<Vec<_>>(), [(0, 32), (32, 4)]);

        assert_eq!(registry.release(b), Ok(4));
        assert_eq!(registry.release(a), Ok(32));
        assert!(!registry.is_allocated(a));
        assert_eq!(free_map(&registry), map(&[(128, &[0])]));
    }

    #[test]
    fn min_block_size_rounds_requests() {
        let mut registry = BuddyRegistry::with_min_block_size(256, 16).unwrap();

        assert_eq!(registry.block_size_for(1), Ok(16));
        assert_eq!(registry.block_size_for(17), Ok(32));

        let a = registry.allocate(1).unwrap();
        let b = registry.allocate(5).unwrap();
        assert_eq!((a, b), (0, 16));
        assert_eq!(registry.block_size_of(b), Some(16));

        // Any size rounding to the same block is accepted.
        registry.deallocate(b, 16).unwrap();
        registry.deallocate(a, 3).unwrap();
        assert_eq!(free_map(&registry), map(&[(256, &[0])]));
    }

    #[test]
    fn stats_track_usage() {
        let mut registry = BuddyRegistry::new(128).unwrap();
        registry.allocate(20).unwrap();
        registry.allocate(10).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total_bytes, 128);
        assert_eq!(stats.used_bytes, 48);
        assert_eq!(stats.free_bytes, 80);
        assert_eq!(stats.used_blocks, 2);
        assert_eq!(stats.free_blocks, 2);
        assert_eq!(stats.largest_free_block, Some(64));

        registry.allocate(64).unwrap();
        registry.allocate(16).unwrap();
        let stats = registry.stats();
        assert_eq!(stats.free_bytes, 0);
        assert_eq!(stats.largest_free_block, None);
    }

    #[test]
    fn refcell_wrapper() {
        let registry = RefCellBuddyRegistry::new(BuddyRegistry::new(128).unwrap());

        let a = registry.allocate(20).unwrap();
        let b = registry.allocate(50).unwrap();
        assert_eq!(registry.stats().used_bytes, 96);

        registry.deallocate(a, 20).unwrap();
        assert_eq!(registry.release(b), Ok(64));

        let inner = registry.into_inner();
        assert_eq!(free_map(&inner), map(&[(128, &[0])]));
    }

    #[cfg(feature = "std")]
    #[test]
    fn mutex_wrapper_across_threads() {
        use std::{sync::Arc, thread};

        const THREADS: usize = 4;
        const ROUNDS: usize = 64;

        let registry = Arc::new(MutexBuddyRegistry::from(BuddyRegistry::new(1 << 12).unwrap()));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for round in 0..ROUNDS {
                        let size = 1 + (t * ROUNDS + round) % 100;
                        let addr = registry.allocate(size).unwrap();
                        registry.deallocate(addr, size).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let registry = Arc::try_unwrap(registry).unwrap().into_inner();
        assert_eq!(free_map(&registry), map(&[(1 << 12, &[0])]));
        assert_eq!(registry.stats().used_blocks, 0);
    }
}
