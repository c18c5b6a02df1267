//! A small library for ~~hating on~~ evaluating the correctness of
//! address-space allocators.
//!
//! An allocator under test only hands out address ranges; no memory is
//! touched. The [`Evaluator`] keeps a shadow list of outstanding blocks and
//! checks every range the allocator returns against it.

use core::ops::Range;

/// Limit on request sizes, expressed in bits.
pub const REQUEST_LIMIT_BITS: u8 = 24;

/// A request size which implements `Arbitrary`.
///
/// Sizes are spread roughly evenly across powers of two, and include zero.
#[derive(Copy, Clone, Debug)]
pub struct ArbRequest(pub usize);

impl arbitrary::Arbitrary<'_> for ArbRequest {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        // Select a random bit index and shift to obtain a power of two bound.
        let shift = u8::arbitrary(u)? % (REQUEST_LIMIT_BITS + 1);
        let bound: usize = 1 << shift;

        Ok(ArbRequest(usize::arbitrary(u)? % bound))
    }
}

#[derive(arbitrary::Arbitrary)]
enum AllocatorOpTag {
    Alloc,
    Dealloc,
}

#[derive(Clone, Debug)]
pub enum AllocatorOp {
    /// Allocate a block of at least this many addresses.
    Alloc(usize),
    /// Free an outstanding block.
    ///
    /// Given `n` outstanding blocks, the block to free is at index `idx % n`.
    Dealloc(usize),
}

impl arbitrary::Arbitrary<'_> for AllocatorOp {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let tag = AllocatorOpTag::arbitrary(u)?;

        let op = match tag {
            AllocatorOpTag::Alloc => AllocatorOp::Alloc(ArbRequest::arbitrary(u)?.0),
            AllocatorOpTag::Dealloc => AllocatorOp::Dealloc(usize::arbitrary(u)?),
        };

        Ok(op)
    }
}

pub trait Subject {
    type AllocError;
    type DeallocError;

    /// Returns the size of the address space managed by the subject.
    ///
    /// Every returned range must lie within `0..capacity`.
    fn capacity(&self) -> usize;

    /// Allocates a block of at least `size` addresses, returning the range of
    /// addresses actually granted.
    fn allocate(&mut self, size: usize) -> Result<Range<usize>, Self::AllocError>;

    /// Deallocates `block`, which was granted for a request of `size`.
    fn deallocate(&mut self, block: Range<usize>, size: usize) -> Result<(), Self::DeallocError>;
}

/// A list of outstanding blocks.
#[derive(Default)]
pub struct Blocks {
    blocks: Vec<Block>,
}

impl Blocks {
    pub fn new() -> Blocks {
        Blocks { blocks: Vec::new() }
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn remove_modulo(&mut self, idx: usize) -> Option<Block> {
        let len = self.blocks.len();
        (len != 0).then(|| self.blocks.swap_remove(idx % len))
    }

    /// Returns the ID of an outstanding block which overlaps `range`, if any.
    pub fn overlapping(&self, range: &Range<usize>) -> Option<u64> {
        self.blocks
            .iter()
            .find(|b| b.range.start < range.end && range.start < b.range.end)
            .map(|b| b.id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl IntoIterator for Blocks {
    type Item = Block;

    type IntoIter = std::vec::IntoIter<Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

/// An allocated block of addresses.
#[derive(Clone, Debug)]
pub struct Block {
    // The granted range.
    range: Range<usize>,
    // The original request size.
    size: usize,
    // The unique ID of the operation that allocated this block.
    id: u64,
}

impl Block {
    pub fn new(range: Range<usize>, size: usize, id: u64) -> Block {
        Block { range, size, id }
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn into_raw_parts(self) -> (Range<usize>, usize) {
        (self.range, self.size)
    }
}

/// The reason an evaluation failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// The granted range is smaller than the request.
    TooSmall { granted: Range<usize>, size: usize },
    /// The granted range extends past the subject's capacity.
    OutOfBounds { granted: Range<usize> },
    /// The granted range overlaps the block allocated by operation `other`.
    Overlap { granted: Range<usize>, other: u64 },
    /// The subject rejected the deallocation of a block it had granted.
    DeallocRejected { block: Range<usize> },
}

pub struct Evaluator<S: Subject> {
    subject: S,
}

#[derive(Clone, Debug)]
pub struct Failed {
    pub completed: Vec<AllocatorOp>,
    pub failed_op: AllocatorOp,
    pub violation: Violation,
}

impl<S: Subject> Evaluator<S> {
    pub fn new(subject: S) -> Evaluator<S> {
        Evaluator { subject }
    }

    pub fn subject(&self) -> &S {
        &self.subject
    }

    pub fn into_subject(self) -> S {
        self.subject
    }

    pub fn evaluate<I>(&mut self, ops: I) -> Result<(), Failed>
    where
        I: IntoIterator<Item = AllocatorOp>,
    {
        let mut completed = Vec::new();
        let mut blocks = Blocks::new();

        for (op_id, op) in ops.into_iter().enumerate() {
            let op_id = op_id as u64;

            if let Err(violation) = self.apply(&mut blocks, &op, op_id) {
                return Err(Failed {
                    completed,
                    failed_op: op,
                    violation,
                });
            }

            completed.push(op);
        }

        for block in blocks {
            let (range, size) = block.into_raw_parts();
            if self.subject.deallocate(range.clone(), size).is_err() {
                return Err(Failed {
                    failed_op: AllocatorOp::Dealloc(0),
                    completed,
                    violation: Violation::DeallocRejected { block: range },
                });
            }
        }

        Ok(())
    }

    fn apply(&mut self, blocks: &mut Blocks, op: &AllocatorOp, op_id: u64) -> Result<(), Violation> {
        match *op {
            AllocatorOp::Alloc(size) => {
                let granted = match self.subject.allocate(size) {
                    Ok(r) => r,
                    Err(_) => return Ok(()),
                };

                if granted.len() < size {
                    return Err(Violation::TooSmall { granted, size });
                }

                if granted.end > self.subject.capacity() || granted.start > granted.end {
                    return Err(Violation::OutOfBounds { granted });
                }

                if let Some(other) = blocks.overlapping(&granted) {
                    return Err(Violation::Overlap { granted, other });
                }

                blocks.push(Block::new(granted, size, op_id));
            }

            AllocatorOp::Dealloc(raw_idx) => {
                let Some(block) = blocks.remove_modulo(raw_idx) else {
                    return Ok(());
                };

                let (range, size) = block.into_raw_parts();
                if self.subject.deallocate(range.clone(), size).is_err() {
                    return Err(Violation::DeallocRejected { block: range });
                }
            }
        }

        Ok(())
    }
}
