//! A small library for ~~hating on~~ evaluating the correctness of offset
//! allocators.
//!
//! The evaluator plays the part of the allocator's host: it owns a real byte
//! arena, copies a pattern into every block the subject hands out and checks
//! that the pattern is intact before the block is freed. Two live blocks that
//! overlap clobber each other's pattern and are caught on the next check.

use core::ops::Range;

/// Limit on allocation size, expressed in bits.
const ALLOC_LIMIT_BITS: u32 = 20;

/// A request size which implements `Arbitrary`.
///
/// Sizes are spread over orders of magnitude rather than uniformly, so small
/// requests are as likely as large ones.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArbSize(pub usize);

impl arbitrary::Arbitrary<'_> for ArbSize {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let exp = u32::arbitrary(u)? % (ALLOC_LIMIT_BITS + 1);
        let size = usize::arbitrary(u)? % (1 << exp);

        Ok(ArbSize(size))
    }
}

#[derive(arbitrary::Arbitrary)]
enum AllocatorOpTag {
    Alloc,
    Free,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocatorOp {
    /// Allocate a block of at least this many bytes.
    Alloc(usize),
    /// Free an outstanding block.
    ///
    /// Given `n` outstanding blocks, the block to free is at index `idx % n`.
    Free(usize),
}

impl arbitrary::Arbitrary<'_> for AllocatorOp {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let tag = AllocatorOpTag::arbitrary(u)?;

        let op = match tag {
            AllocatorOpTag::Alloc => AllocatorOp::Alloc(ArbSize::arbitrary(u)?.0),
            AllocatorOpTag::Free => AllocatorOp::Free(usize::arbitrary(u)?),
        };

        Ok(op)
    }
}

pub trait Subject {
    type AllocError;
    type FreeError;

    /// Returns the size of the arena the subject manages.
    fn capacity(&self) -> usize;

    /// Allocates at least `size` bytes and returns the byte range handed out.
    fn allocate(&mut self, size: usize) -> Result<Range<usize>, Self::AllocError>;

    /// Frees the block starting at `offset`.
    fn free(&mut self, offset: usize) -> Result<(), Self::FreeError>;
}

/// A list of allocated blocks.
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
}

impl IntoIterator for Blocks {
    type Item = Block;

    type IntoIter = std::vec::IntoIter<Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

/// An allocated block of the arena.
#[derive(Clone, Debug)]
pub struct Block {
    // The range handed out by the subject.
    range: Range<usize>,
    // The unique ID of the last operation that wrote to this block.
    id: u64,
}

impl Block {
    /// Creates a block covering `range` and paints it according to `id`.
    pub fn init(arena: &mut [u8], range: Range<usize>, id: u64) -> Block {
        let mut b = Block { range, id };
        b.paint(arena, id);
        b
    }

    /// Returns the offset of the block.
    pub fn offset(&self) -> usize {
        self.range.start
    }

    /// "Paints" the block's bytes of `arena` with the value of `id`.
    pub fn paint(&mut self, arena: &mut [u8], id: u64) {
        self.id = id;

        let id_bytes = id.to_le_bytes().into_iter().cycle();
        for (byte, value) in arena[self.range.clone()].iter_mut().zip(id_bytes) {
            *byte = value;
        }
    }

    /// Verifies that the block's bytes of `arena` have not been overwritten.
    pub fn verify(&self, arena: &[u8]) -> bool {
        let id_bytes = self.id.to_le_bytes().into_iter().cycle();

        arena[self.range.clone()]
            .iter()
            .zip(id_bytes)
            .all(|(byte, value)| *byte == value)
    }
}

/// Why an evaluation failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// A live block was overwritten by another allocation.
    Corrupted,
    /// The subject handed out a range that is empty, too small or outside
    /// the arena.
    BadRange(Range<usize>),
    /// The subject refused to free a live block.
    FreeRejected(usize),
}

#[derive(Clone, Debug)]
pub struct Failed {
    pub completed: Vec<AllocatorOp>,
    pub failed_op: Option<AllocatorOp>,
    pub failure: Failure,
}

pub struct Evaluator<S: Subject> {
    subject: S,
    arena: Vec<u8>,
}

impl<S: Subject> Evaluator<S> {
    pub fn new(subject: S) -> Evaluator<S> {
        let arena = vec![0; subject.capacity()];
        Evaluator { subject, arena }
    }

    /// Returns the subject.
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
            let op_id: u64 = op_id.try_into().unwrap();
            match op {
                AllocatorOp::Alloc(size) => {
                    let range = match self.subject.allocate(size) {
                        Ok(r) => r,
                        Err(_) => continue,
                    };

                    if range.len() < size.max(1) || range.end > self.arena.len() {
                        return Err(Failed {
                            completed,
                            failed_op: Some(op),
                            failure: Failure::BadRange(range),
                        });
                    }

                    blocks.push(Block::init(&mut self.arena, range, op_id));
                }

                AllocatorOp::Free(raw_idx) => {
                    let mut block = match blocks.remove_modulo(raw_idx) {
                        Some(b) => b,
                        None => continue,
                    };

                    if !block.verify(&self.arena) {
                        return Err(Failed {
                            completed,
                            failed_op: Some(op),
                            failure: Failure::Corrupted,
                        });
                    }

                    block.paint(&mut self.arena, op_id);
                    if self.subject.free(block.offset()).is_err() {
                        return Err(Failed {
                            completed,
                            failed_op: Some(op),
                            failure: Failure::FreeRejected(block.offset()),
                        });
                    }
                }
            }

            completed.push(op);
        }

        for block in blocks {
            if !block.verify(&self.arena) {
                return Err(Failed {
                    completed,
                    failed_op: None,
                    failure: Failure::Corrupted,
                });
            }

            if self.subject.free(block.offset()).is_err() {
                return Err(Failed {
                    completed,
                    failed_op: None,
                    failure: Failure::FreeRejected(block.offset()),
                });
            }
        }

        Ok(())
    }
}
