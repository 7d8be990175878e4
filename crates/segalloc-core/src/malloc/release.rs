//! Release engine: pointer validation, freeing and boundary-tag coalescing.

use super::allocator::SegHeap;
use super::block::{
    ALIGNMENT, BlockWord, WORD, is_degenerate, read_header, read_left_footer, set_left_allocated,
    write_free_block, write_header,
};
use super::log::AllocatorLogLevel;
use super::size_class::class_of_size;
use crate::arena::ArenaProvider;
use crate::error::AllocError;

impl<A: ArenaProvider> SegHeap<A> {
    /// Frees the allocation at payload offset `ptr`. Offset 0 is a no-op.
    ///
    /// Rejected without touching the arena: offsets outside the block
    /// region, misaligned offsets, headers that are already free, and spans
    /// running past the sentinel. An offset inside a live payload whose
    /// preceding word happens to look like an allocated header is only
    /// caught with [`AllocatorConfig::verify_release`](crate::AllocatorConfig).
    pub fn release(&mut self, ptr: usize) -> Result<(), AllocError> {
        self.release_for("free", ptr)
    }

    pub(crate) fn release_for(&mut self, symbol: &'static str, ptr: usize) -> Result<(), AllocError> {
        if ptr == 0 {
            return Ok(());
        }
        let header = self.checked_header(symbol, ptr)?;
        self.free_block(symbol, header);
        Ok(())
    }

    /// Validates `ptr` and logs the rejection if it fails.
    pub(crate) fn checked_header(
        &mut self,
        symbol: &'static str,
        ptr: usize,
    ) -> Result<usize, AllocError> {
        self.allocated_header(ptr).inspect_err(|err| {
            self.stats.rejected += 1;
            let outcome = match err {
                AllocError::DoubleFree { .. } => "double_free",
                AllocError::NotInitialized => "not_initialized",
                _ => "invalid_pointer",
            };
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                symbol,
                "validate",
                Some(ptr),
                None,
                None,
                outcome,
                format_args!("{err}"),
            );
        })
    }

    /// Header offset of the allocation whose payload starts at `ptr`, as far
    /// as the header word and (optionally) a physical walk can tell.
    pub(crate) fn allocated_header(&self, ptr: usize) -> Result<usize, AllocError> {
        if !self.initialized {
            return Err(AllocError::NotInitialized);
        }
        let invalid = AllocError::InvalidPointer { ptr };
        let sentinel = self.sentinel();
        if ptr < self.first_block() + WORD || ptr - WORD >= sentinel {
            return Err(invalid);
        }
        if (ptr - self.heap_start) % ALIGNMENT != 0 {
            return Err(invalid);
        }
        let header = ptr - WORD;
        let word = read_header(&self.arena, header);
        if !word.is_allocated() {
            return Err(AllocError::DoubleFree { ptr });
        }
        if word.size() == 0 || word.span() % ALIGNMENT != 0 {
            return Err(invalid);
        }
        match header.checked_add(word.span()) {
            Some(end) if end <= sentinel => {}
            _ => return Err(invalid),
        }
        if self.config.verify_release
            && !self
                .blocks()
                .take_while(|block| block.header <= header)
                .any(|block| block.header == header)
        {
            return Err(invalid);
        }
        Ok(header)
    }

    /// Marks the validated allocated block at `header` free and merges it.
    pub(crate) fn free_block(&mut self, symbol: &'static str, header: usize) {
        let word = read_header(&self.arena, header);
        let size = word.size();
        write_free_block(&mut self.arena, header, size, word.is_left_allocated());
        let merged = self.coalesce(header);

        self.stats.releases += 1;
        self.stats.live_blocks = self.stats.live_blocks.saturating_sub(1);
        self.stats.live_bytes = self.stats.live_bytes.saturating_sub(size);
        let merged_size = read_header(&self.arena, merged).size();
        self.record_lifecycle(
            AllocatorLogLevel::Trace,
            symbol,
            "free",
            Some(header + WORD),
            Some(size),
            Some(class_of_size(size)),
            "success",
            format_args!("merged_at={merged} merged_size={merged_size}"),
        );
    }

    /// Merges the free block at `header` with its free neighbours and links
    /// the result. Returns the header of the merged block.
    ///
    /// `header` must already carry a free header and footer and must not be
    /// on any list. Absorbed headers are zeroed so a stale pointer into them
    /// reads as free.
    pub(crate) fn coalesce(&mut self, header: usize) -> usize {
        let word = read_header(&self.arena, header);
        let mut start = header;
        let mut size = word.size();
        let mut left_allocated = word.is_left_allocated();

        let right = header + word.span();
        let right_word = read_header(&self.arena, right);
        let right_free = !right_word.is_allocated();
        if right_free {
            let right_size = right_word.size();
            if !is_degenerate(right_size) {
                self.index.unlink(&mut self.arena, right, right_size);
            }
            size += right_size + WORD;
            self.arena.write_word(right, 0);
        }

        let left_free = !word.is_left_allocated();
        if left_free {
            let left_size = read_left_footer(&self.arena, header).size();
            let left = header - left_size - WORD;
            if !is_degenerate(left_size) {
                self.index.unlink(&mut self.arena, left, left_size);
            }
            left_allocated = read_header(&self.arena, left).is_left_allocated();
            start = left;
            size += left_size + WORD;
            self.arena.write_word(header, 0);
        }

        write_free_block(&mut self.arena, start, size, left_allocated);
        set_left_allocated(&mut self.arena, start + size + WORD, false);
        if !is_degenerate(size) {
            self.index
                .insert_head(&mut self.arena, class_of_size(size), start);
        }

        if left_free || right_free {
            self.stats.coalesces += 1;
            self.record_lifecycle(
                AllocatorLogLevel::Trace,
                "free",
                "coalesce",
                Some(start + WORD),
                Some(size),
                Some(class_of_size(size)),
                "success",
                format_args!("left={left_free} right={right_free}"),
            );
        }
        start
    }

    /// Shrinks the allocated block at `header` to `required` bytes and frees
    /// the tail. `required` must be smaller than the current size.
    pub(crate) fn split_allocated(&mut self, header: usize, required: usize) {
        let word = read_header(&self.arena, header);
        let old_size = word.size();
        write_header(
            &mut self.arena,
            header,
            BlockWord::encode(required, true, word.is_left_allocated()),
        );
        let tail = header + WORD + required;
        write_free_block(&mut self.arena, tail, old_size - required - WORD, true);
        self.coalesce(tail);
        self.stats.splits += 1;
        self.stats.live_bytes = self.stats.live_bytes.saturating_sub(old_size - required);
    }
}
