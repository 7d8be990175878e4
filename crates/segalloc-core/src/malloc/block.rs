//! Block metadata codec.
//!
//! Every block starts with one metadata word:
//!
//! ```text
//!   63                                   3   2   1   0
//!   +------------------------------------+---+---+---+
//!   |          payload size (x8)         | 0 | L | A |
//!   +------------------------------------+---+---+---+
//!   A = block allocated, L = left neighbour allocated
//! ```
//!
//! Free blocks mirror the word into their last word (the footer) so the right
//! neighbour can walk backwards. Allocated blocks have no footer; their right
//! neighbour learns their state from its own `L` bit instead.

use crate::arena::ArenaProvider;

/// Metadata word size in bytes.
pub const WORD: usize = 8;

/// Payload alignment in bytes. Block spans are multiples of this.
pub const ALIGNMENT: usize = 16;

const ALLOCATED_BIT: u64 = 0x1;
const LEFT_ALLOCATED_BIT: u64 = 0x2;
const SIZE_MASK: u64 = !((WORD as u64) - 1);

/// One encoded header or footer word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockWord(u64);

impl BlockWord {
    /// Encodes a payload size and the two state bits.
    ///
    /// `size` must be a multiple of [`WORD`].
    #[must_use]
    pub const fn encode(size: usize, allocated: bool, left_allocated: bool) -> Self {
        debug_assert!(size % WORD == 0);
        let mut raw = size as u64 & SIZE_MASK;
        if allocated {
            raw |= ALLOCATED_BIT;
        }
        if left_allocated {
            raw |= LEFT_ALLOCATED_BIT;
        }
        Self(raw)
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Payload size in bytes (excludes the header word).
    #[must_use]
    pub const fn size(self) -> usize {
        (self.0 & SIZE_MASK) as usize
    }

    /// Bytes the block occupies in the arena, header included.
    #[must_use]
    pub const fn span(self) -> usize {
        self.size() + WORD
    }

    #[must_use]
    pub const fn is_allocated(self) -> bool {
        self.0 & ALLOCATED_BIT != 0
    }

    #[must_use]
    pub const fn is_left_allocated(self) -> bool {
        self.0 & LEFT_ALLOCATED_BIT != 0
    }

    /// `(size, allocated, left_allocated)`.
    #[must_use]
    pub const fn decode(self) -> (usize, bool, bool) {
        (self.size(), self.is_allocated(), self.is_left_allocated())
    }

    #[must_use]
    pub const fn with_left_allocated(self, left_allocated: bool) -> Self {
        Self::encode(self.size(), self.is_allocated(), left_allocated)
    }
}

/// Payload offset of the block whose header is at `header`.
#[inline]
#[must_use]
pub const fn payload_of(header: usize) -> usize {
    header + WORD
}

/// A free block this small has no room for list links and is never linked.
#[inline]
#[must_use]
pub const fn is_degenerate(size: usize) -> bool {
    size <= WORD
}

#[inline]
pub fn read_header<A: ArenaProvider + ?Sized>(arena: &A, header: usize) -> BlockWord {
    BlockWord::from_raw(arena.read_word(header))
}

#[inline]
pub fn write_header<A: ArenaProvider + ?Sized>(arena: &mut A, header: usize, word: BlockWord) {
    arena.write_word(header, word.raw());
}

/// Mirrors `word` into the last word of the block at `header`.
#[inline]
pub fn write_footer<A: ArenaProvider + ?Sized>(arena: &mut A, header: usize, word: BlockWord) {
    arena.write_word(header + word.size(), word.raw());
}

/// Writes header and footer of a free block.
pub fn write_free_block<A: ArenaProvider + ?Sized>(
    arena: &mut A,
    header: usize,
    size: usize,
    left_allocated: bool,
) {
    let word = BlockWord::encode(size, false, left_allocated);
    write_header(arena, header, word);
    write_footer(arena, header, word);
}

/// Reads the word just before `header`: the footer of the left neighbour
/// when that neighbour is free.
#[inline]
pub fn read_left_footer<A: ArenaProvider + ?Sized>(arena: &A, header: usize) -> BlockWord {
    BlockWord::from_raw(arena.read_word(header - WORD))
}

/// Rewrites only the left-allocated bit of the word at `header`.
pub fn set_left_allocated<A: ArenaProvider + ?Sized>(arena: &mut A, header: usize, flag: bool) {
    let word = read_header(arena, header);
    write_header(arena, header, word.with_left_allocated(flag));
}
