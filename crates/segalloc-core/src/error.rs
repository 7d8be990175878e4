//! Error taxonomy for the allocator engine and its arena providers.

use thiserror::Error;

/// Failure reported by an [`ArenaProvider`](crate::ArenaProvider).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The provider cannot extend the arena by the requested amount.
    #[error("arena exhausted: requested {requested} bytes, {available} available")]
    Exhausted { requested: usize, available: usize },
    /// The operating system refused to map backing memory.
    #[error("arena mapping failed (errno {errno})")]
    MapFailed { errno: i32 },
}

/// What the heap checker found wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CorruptionKind {
    #[error("arena is smaller than the directory header")]
    TruncatedArena,
    #[error("prologue word is not an allocated zero-size block")]
    BadPrologue,
    #[error("sentinel word is not an allocated zero-size block")]
    BadSentinel,
    #[error("payload is not 16-byte aligned")]
    MisalignedPayload,
    #[error("block span is not a positive multiple of 16")]
    BadSpan,
    #[error("block extends past the sentinel")]
    OutOfBounds,
    #[error("left-allocated flag disagrees with the left neighbour")]
    LeftFlagMismatch,
    #[error("free block header and footer differ")]
    FooterMismatch,
    #[error("two physically adjacent blocks are both free")]
    AdjacentFree,
    #[error("free-list entry is not the start of a block")]
    DanglingLink,
    #[error("free-list entry is marked allocated")]
    AllocatedInFreeList,
    #[error("free-list entry sits in the wrong size class")]
    WrongClass,
    #[error("free-list prev link does not match the traversal")]
    BrokenBackLink,
    #[error("block is linked more than once")]
    DuplicateLink,
    #[error("linkable free block is missing from every free list")]
    UnlinkedFreeBlock,
}

/// Error returned by the public allocator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// An operation ran before [`SegHeap::init`](crate::SegHeap::init).
    #[error("allocator used before init")]
    NotInitialized,
    /// Zero-byte request.
    #[error("invalid allocation size")]
    InvalidSize,
    /// `count * size` does not fit in `usize`.
    #[error("size overflow: {count} x {size}")]
    SizeOverflow { count: usize, size: usize },
    /// The arena provider could not grow, or the request cannot be encoded.
    #[error("out of memory ({requested} bytes requested)")]
    OutOfMemory { requested: usize },
    /// Pointer outside the block region, misaligned, or not a block start.
    #[error("invalid pointer {ptr:#x}")]
    InvalidPointer { ptr: usize },
    /// Pointer names a block that is already free.
    #[error("double free of {ptr:#x}")]
    DoubleFree { ptr: usize },
    /// The arena provider handed out a heap start that is not 16-byte aligned.
    #[error("arena start {offset:#x} is not 16-byte aligned")]
    UnalignedArena { offset: usize },
    /// Raised by the heap checker only.
    #[error("heap corruption at {offset:#x}: {kind}")]
    CorruptionDetected { offset: usize, kind: CorruptionKind },
}
