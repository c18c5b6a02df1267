//! Buddy-system bookkeeping over an abstract address space.
//!
//! A [`BuddyRegistry`] manages a power-of-two range of addresses starting at
//! zero. It hands out power-of-two-sized, naturally aligned blocks, splitting
//! larger free blocks as needed, and coalesces freed blocks with their buddies.
//! No memory is ever read or written; the registry only tracks which ranges
//! are free, which makes it suitable as the allocation core of a heap, a GPU
//! arena or a block-device space manager.
//!
//! ```
//! use buddy_registry::BuddyRegistry;
//!
//! let mut registry = BuddyRegistry::new(128).unwrap();
//!
//! let a = registry.allocate(20).unwrap();
//! let b = registry.allocate(50).unwrap();
//! assert_eq!((a, b), (0, 64));
//!
//! registry.deallocate(a, 20).unwrap();
//! registry.deallocate(b, 50).unwrap();
//! assert_eq!(registry.free_bytes(), 128);
//! ```

#![doc(html_root_url = "https://docs.rs/buddy_registry/0.1.0")]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docs_rs, feature(doc_cfg))]

extern crate alloc;

pub mod buddy;
mod size_class;
mod snapshot;
mod stats;


use core::fmt;

pub use crate::{
    buddy::{BuddyRegistry, RefCellBuddyRegistry},
    snapshot::Snapshot,
    stats::RegistryStats,
};

#[cfg(feature = "std")]
pub use crate::buddy::MutexBuddyRegistry;

/// The error type for registry constructors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocInitError {
    /// The configuration of the registry is invalid.
    ///
    /// This variant is returned when the capacity is not a nonzero power of
    /// two, or when the minimum block size is not a power of two no larger
    /// than the capacity.
    InvalidConfig,
}

impl fmt::Display for AllocInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocInitError::InvalidConfig => f.write_str("invalid registry configuration"),
        }
    }
}

/// Indicates an allocation failure due to resource exhaustion or an
/// unsupported request size.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// A zero-sized block was requested.
    ZeroSize,

    /// The request, rounded up to a power of two, is larger than the whole
    /// arena.
    ///
    /// Retrying cannot succeed without a larger registry.
    SizeExceedsCapacity,

    /// No free block is currently large enough.
    ///
    /// The request may succeed after other blocks are deallocated.
    OutOfMemory,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AllocError::ZeroSize => "zero-sized allocation request",
            AllocError::SizeExceedsCapacity => "requested size exceeds registry capacity",
            AllocError::OutOfMemory => "no free block large enough",
        };

        f.write_str(msg)
    }
}

/// Indicates that a deallocation request was rejected.
///
/// A rejected deallocation never modifies the registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeallocError {
    /// The block size is zero, or rounds up to more than the arena.
    InvalidBlockSize,

    /// The address is not the start of an outstanding allocation, or that
    /// allocation has a different block size.
    ///
    /// This is also returned for double frees.
    UnknownOrMismatchedBlock,
}

impl fmt::Display for DeallocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DeallocError::InvalidBlockSize => "invalid block size",
            DeallocError::UnknownOrMismatchedBlock => "address does not match an allocated block",
        };

        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
#[cfg_attr(docs_rs, doc(cfg(feature = "std")))]
impl std::error::Error for AllocInitError {}

#[cfg(feature = "std")]
#[cfg_attr(docs_rs, doc(cfg(feature = "std")))]
impl std::error::Error for AllocError {}

#[cfg(feature = "std")]
#[cfg_attr(docs_rs, doc(cfg(feature = "std")))]
impl std::error::Error for DeallocError {}
