//! Power-of-two arithmetic shared by the registry.

/// Rounds `x` up to the next power of two.
///
/// Returns `None` if `x` is zero or if the result would overflow a `usize`.
#[inline]
pub fn round_up_pow2(x: usize) -> Option<usize> {
    match x {
        0 => None,
        x => x.checked_next_power_of_two(),
    }
}

/// Returns the address of the buddy of the `size`-byte block at `addr`.
#[inline]
pub const fn buddy_of(addr: usize, size: usize) -> usize {
    addr ^ size
}

/// Returns the address of the block formed by merging the `size`-byte block
/// at `addr` with its buddy.
#[inline]
pub const fn parent_of(addr: usize, size: usize) -> usize {
    addr & !size
}

/// Checks whether `addr` is a multiple of `size`.
///
/// `size` must be a power of two.
#[inline]
pub const fn is_aligned(addr: usize, size: usize) -> bool {
    addr & (size - 1) == 0
}
