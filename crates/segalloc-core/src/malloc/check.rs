//! Heap walker and consistency checker.
//!
//! `check_heap` verifies every structural invariant the engine relies on and
//! reports the first violation it finds. It never mutates the arena, reads
//! only inside the arena, and terminates on arbitrary corruption.

use std::collections::HashSet;

use super::allocator::{FIRST_BLOCK_OFFSET, INIT_BYTES, PROLOGUE_OFFSET, SegHeap};
use super::block::{ALIGNMENT, BlockWord, WORD, is_degenerate, payload_of, read_header};
use super::free_list::prev_link;
use super::size_class::{NUM_CLASSES, class_of_size};
use crate::arena::ArenaProvider;
use crate::error::{AllocError, CorruptionKind};

/// One block found by the physical walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub header: usize,
    pub payload: usize,
    /// Payload size in bytes.
    pub size: usize,
    pub allocated: bool,
    pub left_allocated: bool,
}

/// Summary produced by a successful [`SegHeap::check_heap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapReport {
    pub arena_bytes: usize,
    pub heap_start: usize,
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    /// Free blocks too small to be linked.
    pub degenerate_blocks: usize,
    pub largest_free: usize,
    /// Linked free blocks per size class.
    pub class_counts: [usize; NUM_CLASSES],
}

/// Physical walk from the first block to the sentinel.
///
/// Stops early at a zero-size or out-of-range block, so it is safe on a
/// corrupted heap; use [`SegHeap::check_heap`] to tell the two apart.
pub struct BlockIter<'a, A: ArenaProvider> {
    arena: &'a A,
    current: usize,
    end: usize,
}

impl<A: ArenaProvider> Iterator for BlockIter<'_, A> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        if self.current >= self.end {
            return None;
        }
        let header = self.current;
        let word = read_header(self.arena, header);
        let size = word.size();
        match header.checked_add(word.span()) {
            Some(next) if size > 0 && next <= self.end => self.current = next,
            _ => {
                self.current = self.end;
                return None;
            }
        }
        Some(BlockInfo {
            header,
            payload: payload_of(header),
            size,
            allocated: word.is_allocated(),
            left_allocated: word.is_left_allocated(),
        })
    }
}

fn corrupt(offset: usize, kind: CorruptionKind) -> AllocError {
    AllocError::CorruptionDetected { offset, kind }
}

impl<A: ArenaProvider> SegHeap<A> {
    /// Iterates the blocks between prologue and sentinel in address order.
    pub fn blocks(&self) -> BlockIter<'_, A> {
        let (current, end) = if self.initialized && self.arena.len() >= self.heap_start + INIT_BYTES {
            (self.first_block(), self.sentinel())
        } else {
            (0, 0)
        };
        BlockIter {
            arena: &self.arena,
            current,
            end,
        }
    }

    /// Verifies the whole heap. Returns the first violation found.
    pub fn check_heap(&self) -> Result<HeapReport, AllocError> {
        if !self.initialized {
            return Err(AllocError::NotInitialized);
        }
        let hs = self.heap_start;
        let len = self.arena.len();
        if len < hs + INIT_BYTES || (len - hs) % WORD != 0 {
            return Err(corrupt(hs, CorruptionKind::TruncatedArena));
        }
        let prologue = hs + PROLOGUE_OFFSET;
        if read_header(&self.arena, prologue) != BlockWord::encode(0, true, true) {
            return Err(corrupt(prologue, CorruptionKind::BadPrologue));
        }
        let sentinel = self.sentinel();
        let sentinel_word = read_header(&self.arena, sentinel);
        if sentinel_word.size() != 0 || !sentinel_word.is_allocated() {
            return Err(corrupt(sentinel, CorruptionKind::BadSentinel));
        }

        let mut report = HeapReport {
            arena_bytes: len,
            heap_start: hs,
            allocated_blocks: 0,
            allocated_bytes: 0,
            free_blocks: 0,
            free_bytes: 0,
            degenerate_blocks: 0,
            largest_free: 0,
            class_counts: [0; NUM_CLASSES],
        };
        let mut starts = HashSet::new();
        let mut linkable = Vec::new();
        let mut left_allocated = true;
        let mut header = hs + FIRST_BLOCK_OFFSET;

        while header < sentinel {
            if (payload_of(header) - hs) % ALIGNMENT != 0 {
                return Err(corrupt(header, CorruptionKind::MisalignedPayload));
            }
            let word = read_header(&self.arena, header);
            let size = word.size();
            if size == 0 || word.span() % ALIGNMENT != 0 {
                return Err(corrupt(header, CorruptionKind::BadSpan));
            }
            let next = match header.checked_add(word.span()) {
                Some(next) if next <= sentinel => next,
                _ => return Err(corrupt(header, CorruptionKind::OutOfBounds)),
            };
            if word.is_left_allocated() != left_allocated {
                return Err(corrupt(header, CorruptionKind::LeftFlagMismatch));
            }
            if word.is_allocated() {
                report.allocated_blocks += 1;
                report.allocated_bytes += size;
            } else {
                if self.arena.read_word(header + size) != word.raw() {
                    return Err(corrupt(header, CorruptionKind::FooterMismatch));
                }
                if !left_allocated {
                    return Err(corrupt(header, CorruptionKind::AdjacentFree));
                }
                report.free_blocks += 1;
                report.free_bytes += size;
                report.largest_free = report.largest_free.max(size);
                if is_degenerate(size) {
                    report.degenerate_blocks += 1;
                } else {
                    linkable.push(header);
                }
            }
            starts.insert(header);
            left_allocated = word.is_allocated();
            header = next;
        }
        if sentinel_word.is_left_allocated() != left_allocated {
            return Err(corrupt(sentinel, CorruptionKind::LeftFlagMismatch));
        }

        let mut linked = HashSet::new();
        for class in 0..NUM_CLASSES {
            let mut prev = 0;
            for header in self.index.traverse(&self.arena, class) {
                if !starts.contains(&header) {
                    return Err(corrupt(header, CorruptionKind::DanglingLink));
                }
                let word = read_header(&self.arena, header);
                if word.is_allocated() {
                    return Err(corrupt(header, CorruptionKind::AllocatedInFreeList));
                }
                if class_of_size(word.size()) != class {
                    return Err(corrupt(header, CorruptionKind::WrongClass));
                }
                if !linked.insert(header) {
                    return Err(corrupt(header, CorruptionKind::DuplicateLink));
                }
                if prev_link(&self.arena, header) != prev {
                    return Err(corrupt(header, CorruptionKind::BrokenBackLink));
                }
                report.class_counts[class] += 1;
                prev = header;
            }
        }
        if let Some(&missing) = linkable.iter().find(|header| !linked.contains(*header)) {
            return Err(corrupt(missing, CorruptionKind::UnlinkedFreeBlock));
        }

        Ok(report)
    }

    /// `true` when [`check_heap`](Self::check_heap) finds nothing wrong.
    pub fn check_consistency(&self) -> bool {
        self.check_heap().is_ok()
    }
}
