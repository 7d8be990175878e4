//! Segregated free-list directory.
//!
//! The directory is the first [`NUM_CLASSES`] words of the heap; word `c`
//! holds the header offset of the first free block in class `c`, or 0 for an
//! empty list. Free blocks are linked through two words right after their
//! header:
//!
//! ```text
//!   | header | prev | next | ...unused... | footer |
//! ```
//!
//! A `prev` of 0 marks the list head, a `next` of 0 the list end. Offset 0
//! is always inside the directory, so it can never name a block.

use super::block::{ALIGNMENT, WORD};
use super::size_class::{NUM_CLASSES, class_of_size};
use crate::arena::ArenaProvider;

/// Bytes occupied by the directory.
pub const DIRECTORY_BYTES: usize = NUM_CLASSES * WORD;

const NIL: usize = 0;
const PREV_OFFSET: usize = WORD;
const NEXT_OFFSET: usize = 2 * WORD;

#[inline]
pub fn prev_link<A: ArenaProvider + ?Sized>(arena: &A, header: usize) -> usize {
    arena.read_word(header + PREV_OFFSET) as usize
}

#[inline]
pub fn next_link<A: ArenaProvider + ?Sized>(arena: &A, header: usize) -> usize {
    arena.read_word(header + NEXT_OFFSET) as usize
}

#[inline]
fn set_prev<A: ArenaProvider + ?Sized>(arena: &mut A, header: usize, prev: usize) {
    arena.write_word(header + PREV_OFFSET, prev as u64);
}

#[inline]
fn set_next<A: ArenaProvider + ?Sized>(arena: &mut A, header: usize, next: usize) {
    arena.write_word(header + NEXT_OFFSET, next as u64);
}

/// Handle to the directory at a fixed arena offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeListIndex {
    base: usize,
}

impl FreeListIndex {
    #[must_use]
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    /// Offset of the directory's first word.
    pub const fn base(&self) -> usize {
        self.base
    }

    #[inline]
    const fn slot(&self, class: usize) -> usize {
        self.base + class * WORD
    }

    /// First block of `class`, if any.
    pub fn head<A: ArenaProvider + ?Sized>(&self, arena: &A, class: usize) -> Option<usize> {
        match arena.read_word(self.slot(class)) as usize {
            NIL => None,
            header => Some(header),
        }
    }

    fn set_head<A: ArenaProvider + ?Sized>(&self, arena: &mut A, class: usize, header: usize) {
        arena.write_word(self.slot(class), header as u64);
    }

    /// Empties every class.
    pub fn clear<A: ArenaProvider + ?Sized>(&self, arena: &mut A) {
        for class in 0..NUM_CLASSES {
            self.set_head(arena, class, NIL);
        }
    }

    /// Pushes the free block at `header` onto the front of `class`.
    pub fn insert_head<A: ArenaProvider + ?Sized>(
        &self,
        arena: &mut A,
        class: usize,
        header: usize,
    ) {
        let first = arena.read_word(self.slot(class)) as usize;
        if first != NIL {
            set_prev(arena, first, header);
        }
        self.set_head(arena, class, header);
        set_prev(arena, header, NIL);
        set_next(arena, header, first);
    }

    /// Removes the free block at `header` (payload `size`) from its class.
    pub fn unlink<A: ArenaProvider + ?Sized>(&self, arena: &mut A, header: usize, size: usize) {
        let class = class_of_size(size);
        let prev = prev_link(arena, header);
        let next = next_link(arena, header);

        match (prev, next) {
            // head -> block -> next
            (NIL, next) if next != NIL => {
                self.set_head(arena, class, next);
                set_prev(arena, next, NIL);
            }
            // sole element
            (NIL, _) => self.set_head(arena, class, NIL),
            // tail
            (prev, NIL) => set_next(arena, prev, NIL),
            // interior
            (prev, next) => {
                set_next(arena, prev, next);
                set_prev(arena, next, prev);
            }
        }
    }

    /// Walks `class` from its head following `next` links.
    pub fn traverse<'a, A: ArenaProvider + ?Sized>(
        &self,
        arena: &'a A,
        class: usize,
    ) -> FreeListIter<'a, A> {
        FreeListIter {
            arena,
            current: self.head(arena, class),
            budget: arena.len() / ALIGNMENT + 1,
        }
    }
}

/// Forward iterator over one class list.
///
/// Yields header offsets. It stops after yielding a link that points outside
/// the arena, and after as many steps as the arena could hold blocks, so a
/// corrupted list cannot make it spin forever.
pub struct FreeListIter<'a, A: ArenaProvider + ?Sized> {
    arena: &'a A,
    current: Option<usize>,
    budget: usize,
}

impl<A: ArenaProvider + ?Sized> Iterator for FreeListIter<'_, A> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let header = self.current?;
        if self.budget == 0 {
            self.current = None;
            return None;
        }
        self.budget -= 1;
        self.current = if header + NEXT_OFFSET + WORD <= self.arena.len() {
            match next_link(self.arena, header) {
                NIL => None,
                next => Some(next),
            }
        } else {
            None
        };
        Some(header)
    }
}
