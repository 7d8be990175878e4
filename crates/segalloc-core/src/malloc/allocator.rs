//! Core allocator state and the allocation engine.
//!
//! Heap layout, relative to the heap start (always 16-byte aligned):
//!
//! ```text
//!   +0    directory: 24 class-head words
//!   +192  prologue   (size 0, allocated)
//!   +200  first block header ... blocks ...
//!   top-8 sentinel   (size 0, allocated)
//! ```
//!
//! Payloads start one word after their header, which puts every payload on
//! a 16-byte boundary.

use std::fmt;

use super::block::{
    ALIGNMENT, BlockWord, WORD, payload_of, read_header, set_left_allocated, write_free_block,
    write_header,
};
use super::free_list::{DIRECTORY_BYTES, FreeListIndex};
use super::log::{AllocatorLogLevel, AllocatorLogRecord, Event, HeapStats, LifecycleLog};
use super::size_class::{NUM_CLASSES, align_request, class_of_size, is_exact};
use crate::arena::ArenaProvider;
use crate::config::{AllocatorConfig, SearchPolicy};
use crate::error::AllocError;

/// Offset of the prologue word from the heap start.
pub const PROLOGUE_OFFSET: usize = DIRECTORY_BYTES;

/// Offset of the first block header (initially the sentinel).
pub const FIRST_BLOCK_OFFSET: usize = DIRECTORY_BYTES + WORD;

/// Bytes requested from the arena by [`SegHeap::init`].
pub const INIT_BYTES: usize = DIRECTORY_BYTES + 2 * WORD;

/// Segregated free-list heap over an arena provider.
///
/// Not thread-safe: every operation takes `&mut self` and runs to
/// completion. Share a heap across threads only behind a lock.
pub struct SegHeap<A: ArenaProvider> {
    pub(crate) arena: A,
    pub(crate) config: AllocatorConfig,
    pub(crate) heap_start: usize,
    pub(crate) index: FreeListIndex,
    pub(crate) initialized: bool,
    pub(crate) stats: HeapStats,
    pub(crate) log: LifecycleLog,
}

impl<A: ArenaProvider> SegHeap<A> {
    /// Wraps `arena`. The heap is unusable until [`init`](Self::init).
    pub fn new(arena: A, config: AllocatorConfig) -> Self {
        Self {
            arena,
            config,
            heap_start: 0,
            index: FreeListIndex::new(0),
            initialized: false,
            stats: HeapStats::default(),
            log: LifecycleLog::new(config.lifecycle_logging),
        }
    }

    /// Lays out the directory, prologue and sentinel. Calling it again on an
    /// initialized heap does nothing.
    pub fn init(&mut self) -> Result<(), AllocError> {
        if self.initialized {
            return Ok(());
        }
        let start = self.arena.len();
        if start % ALIGNMENT != 0 {
            self.record_lifecycle(
                AllocatorLogLevel::Error,
                "init",
                "init",
                None,
                Some(INIT_BYTES),
                None,
                "unaligned_arena",
                format_args!("arena_top={start}"),
            );
            return Err(AllocError::UnalignedArena { offset: start });
        }
        if let Err(err) = self.arena.grow_by(INIT_BYTES) {
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                "init",
                "init",
                None,
                Some(INIT_BYTES),
                None,
                "oom",
                format_args!("{err}"),
            );
            return Err(AllocError::OutOfMemory {
                requested: INIT_BYTES,
            });
        }

        self.heap_start = start;
        self.index = FreeListIndex::new(start);
        self.index.clear(&mut self.arena);
        write_header(
            &mut self.arena,
            start + PROLOGUE_OFFSET,
            BlockWord::encode(0, true, true),
        );
        write_header(
            &mut self.arena,
            start + FIRST_BLOCK_OFFSET,
            BlockWord::encode(0, true, true),
        );
        self.initialized = true;
        self.record_lifecycle(
            AllocatorLogLevel::Info,
            "init",
            "init",
            None,
            Some(INIT_BYTES),
            None,
            "success",
            format_args!("heap_start={start} policy={}", self.config.search.as_str()),
        );
        Ok(())
    }

    /// Allocates `size` bytes and returns the payload offset.
    pub fn allocate(&mut self, size: usize) -> Result<usize, AllocError> {
        self.allocate_for("malloc", size)
    }

    /// Allocates `count * size` zeroed bytes.
    pub fn zeroed_allocate(&mut self, count: usize, size: usize) -> Result<usize, AllocError> {
        let Some(total) = count.checked_mul(size) else {
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                "calloc",
                "calloc_overflow",
                None,
                None,
                None,
                "denied",
                format_args!("count={count} size={size}"),
            );
            return Err(AllocError::SizeOverflow { count, size });
        };
        let ptr = self.allocate_for("calloc", total)?;
        self.arena.fill_zero(ptr..ptr + total);
        Ok(ptr)
    }

    pub(crate) fn allocate_for(
        &mut self,
        symbol: &'static str,
        size: usize,
    ) -> Result<usize, AllocError> {
        if !self.initialized {
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                symbol,
                "alloc",
                None,
                Some(size),
                None,
                "not_initialized",
                format_args!(""),
            );
            return Err(AllocError::NotInitialized);
        }
        if size == 0 {
            self.record_lifecycle(
                AllocatorLogLevel::Debug,
                symbol,
                "alloc",
                None,
                Some(size),
                None,
                "invalid_size",
                format_args!("zero_byte_request"),
            );
            return Err(AllocError::InvalidSize);
        }
        let Some(required) = align_request(size) else {
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                symbol,
                "alloc",
                None,
                Some(size),
                None,
                "oom",
                format_args!("size_overflow"),
            );
            return Err(AllocError::OutOfMemory { requested: size });
        };

        match self.find_fit(required) {
            Some((header, class)) => Ok(self.place(symbol, header, required, class)),
            None => self.grow(symbol, required, size),
        }
    }

    /// Searches the classes from the request's own class upwards.
    fn find_fit(&self, required: usize) -> Option<(usize, usize)> {
        let mut class = class_of_size(required);
        let mut skipped = false;

        while class < NUM_CLASSES {
            let found = if is_exact(class) {
                self.index.head(&self.arena, class)
            } else {
                self.best_fit_in(class, required)
            };
            if let Some(header) = found {
                return Some((header, class));
            }

            if is_exact(class) && !skipped && self.config.search == SearchPolicy::SkipSparse {
                class += 2;
                skipped = true;
            } else {
                class += 1;
            }
        }
        None
    }

    /// Smallest block in a range class that holds `required` bytes. An exact
    /// match ends the scan early.
    fn best_fit_in(&self, class: usize, required: usize) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for header in self.index.traverse(&self.arena, class) {
            let size = read_header(&self.arena, header).size();
            if size == required {
                return Some(header);
            }
            if size > required && best.is_none_or(|(_, best_size)| size < best_size) {
                best = Some((header, size));
            }
        }
        best.map(|(header, _)| header)
    }

    /// Turns the free block at `header` into an allocated block of
    /// `required` bytes, splitting off any excess.
    fn place(&mut self, symbol: &'static str, header: usize, required: usize, class: usize) -> usize {
        let word = read_header(&self.arena, header);
        let size = word.size();
        self.index.unlink(&mut self.arena, header, size);
        write_header(
            &mut self.arena,
            header,
            BlockWord::encode(required, true, word.is_left_allocated()),
        );

        if is_exact(class) {
            self.stats.exact_hits += 1;
        } else {
            self.stats.range_hits += 1;
        }

        let split = required < size;
        if split {
            let remainder = header + WORD + required;
            write_free_block(&mut self.arena, remainder, size - required - WORD, true);
            self.coalesce(remainder);
            self.stats.splits += 1;
        } else {
            set_left_allocated(&mut self.arena, header + WORD + size, true);
        }

        self.stats.allocations += 1;
        self.stats.live_blocks += 1;
        self.stats.live_bytes += required;
        let ptr = payload_of(header);
        self.record_lifecycle(
            AllocatorLogLevel::Trace,
            symbol,
            "alloc",
            Some(ptr),
            Some(required),
            Some(class),
            "success",
            format_args!(
                "path={} block_size={size} split={split}",
                if is_exact(class) { "exact_class" } else { "best_fit" }
            ),
        );
        ptr
    }

    /// Grows the arena by one block and moves the sentinel to the new top.
    fn grow(&mut self, symbol: &'static str, required: usize, request: usize) -> Result<usize, AllocError> {
        let extend = required + WORD;
        let old_sentinel = self.sentinel();
        let left_allocated = read_header(&self.arena, old_sentinel).is_left_allocated();

        match self.arena.grow_by(extend) {
            Ok(old_top) => debug_assert_eq!(old_top, old_sentinel + WORD),
            Err(err) => {
                self.record_lifecycle(
                    AllocatorLogLevel::Warn,
                    symbol,
                    "grow",
                    None,
                    Some(extend),
                    Some(class_of_size(required)),
                    "oom",
                    format_args!("{err}"),
                );
                return Err(AllocError::OutOfMemory { requested: request });
            }
        }

        write_header(
            &mut self.arena,
            old_sentinel,
            BlockWord::encode(required, true, left_allocated),
        );
        write_header(
            &mut self.arena,
            old_sentinel + extend,
            BlockWord::encode(0, true, true),
        );

        self.stats.growths += 1;
        self.stats.allocations += 1;
        self.stats.live_blocks += 1;
        self.stats.live_bytes += required;
        let ptr = payload_of(old_sentinel);
        self.record_lifecycle(
            AllocatorLogLevel::Info,
            symbol,
            "grow",
            Some(ptr),
            Some(required),
            Some(class_of_size(required)),
            "success",
            format_args!("extend={extend}"),
        );
        Ok(ptr)
    }

    /// Forgets every allocation: the region between prologue and sentinel
    /// becomes one free block and every old header is zeroed. The arena
    /// keeps its size.
    pub fn reset(&mut self) -> Result<(), AllocError> {
        if !self.initialized {
            return Err(AllocError::NotInitialized);
        }
        self.index.clear(&mut self.arena);
        let first = self.first_block();
        let sentinel = self.sentinel();
        // Zero every old header so stale pointers read as free.
        let headers: Vec<usize> = self.blocks().map(|block| block.header).collect();
        for header in headers {
            self.arena.write_word(header, 0);
        }
        if sentinel > first {
            let size = sentinel - first - WORD;
            write_free_block(&mut self.arena, first, size, true);
            write_header(&mut self.arena, sentinel, BlockWord::encode(0, true, false));
            if !super::block::is_degenerate(size) {
                self.index
                    .insert_head(&mut self.arena, class_of_size(size), first);
            }
        } else {
            write_header(&mut self.arena, sentinel, BlockWord::encode(0, true, true));
        }
        self.stats = HeapStats::default();
        let arena_bytes = self.arena.len();
        self.record_lifecycle(
            AllocatorLogLevel::Info,
            "reset",
            "reset",
            None,
            None,
            None,
            "success",
            format_args!("arena_bytes={arena_bytes}"),
        );
        Ok(())
    }

    /// Usable payload bytes of a live allocation.
    pub fn usable_size(&self, ptr: usize) -> Result<usize, AllocError> {
        let header = self.allocated_header(ptr)?;
        Ok(read_header(&self.arena, header).size())
    }

    /// Payload bytes of a live allocation.
    pub fn payload(&self, ptr: usize) -> Result<&[u8], AllocError> {
        let size = self.usable_size(ptr)?;
        Ok(&self.arena.bytes()[ptr..ptr + size])
    }

    /// Mutable payload bytes of a live allocation.
    pub fn payload_mut(&mut self, ptr: usize) -> Result<&mut [u8], AllocError> {
        let size = self.usable_size(ptr)?;
        Ok(&mut self.arena.bytes_mut()[ptr..ptr + size])
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> AllocatorConfig {
        self.config
    }

    /// Offset of the directory within the arena.
    pub fn heap_start(&self) -> usize {
        self.heap_start
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    pub fn arena(&self) -> &A {
        &self.arena
    }

    /// Raw arena access for debugging tools. Writing through it can break
    /// every heap invariant.
    pub fn arena_mut(&mut self) -> &mut A {
        &mut self.arena
    }

    pub fn into_arena(self) -> A {
        self.arena
    }

    /// Returns a view of allocator lifecycle log records.
    pub fn lifecycle_logs(&self) -> &[AllocatorLogRecord] {
        self.log.records()
    }

    /// Lifecycle records discarded because the log filled up undrained.
    pub fn dropped_lifecycle_records(&self) -> u64 {
        self.log.dropped()
    }

    /// Drains allocator lifecycle log records.
    pub fn drain_lifecycle_logs(&mut self) -> Vec<AllocatorLogRecord> {
        self.log.drain()
    }

    pub(crate) fn first_block(&self) -> usize {
        self.heap_start + FIRST_BLOCK_OFFSET
    }

    pub(crate) fn sentinel(&self) -> usize {
        self.arena.len() - WORD
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn record_lifecycle(
        &mut self,
        level: AllocatorLogLevel,
        symbol: &'static str,
        event: &'static str,
        ptr: Option<usize>,
        size: Option<usize>,
        class: Option<usize>,
        outcome: &'static str,
        details: fmt::Arguments<'_>,
    ) {
        if !self.log.enabled() {
            return;
        }
        let stats = self.stats;
        let arena_bytes = self.arena.len();
        self.log.record(
            Event {
                level,
                symbol,
                event,
                ptr,
                size,
                class,
                outcome,
                details,
            },
            stats,
            arena_bytes,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::VecArena;
    use crate::malloc::size_class::class_of;

    fn heap() -> SegHeap<VecArena> {
        let mut heap = SegHeap::new(VecArena::new(), AllocatorConfig::default());
        heap.init().unwrap();
        heap
    }

    #[test]
    fn init_lays_out_directory_prologue_and_sentinel() {
        let heap = heap();
        assert_eq!(heap.arena().len(), INIT_BYTES);
        assert_eq!(heap.heap_start(), 0);
        let prologue = read_header(heap.arena(), PROLOGUE_OFFSET);
        assert_eq!(prologue.decode(), (0, true, true));
        let sentinel = read_header(heap.arena(), FIRST_BLOCK_OFFSET);
        assert_eq!(sentinel.decode(), (0, true, true));
        for class in 0..NUM_CLASSES {
            assert_eq!(heap.index.head(heap.arena(), class), None);
        }
    }

    #[test]
    fn init_twice_is_a_noop() {
        let mut heap = heap();
        heap.init().unwrap();
        assert_eq!(heap.arena().len(), INIT_BYTES);
    }

    #[test]
    fn allocate_before_init_fails() {
        let mut heap = SegHeap::new(VecArena::new(), AllocatorConfig::default());
        assert_eq!(heap.allocate(16), Err(AllocError::NotInitialized));
        assert_eq!(heap.arena().len(), 0);
    }

    #[test]
    fn init_rejects_unaligned_arena_top() {
        let mut arena = VecArena::new();
        arena.grow_by(8).unwrap();
        let mut heap = SegHeap::new(arena, AllocatorConfig::default());
        assert_eq!(heap.init(), Err(AllocError::UnalignedArena { offset: 8 }));
        assert!(!heap.is_initialized());
        assert_eq!(heap.arena().len(), 8);
    }

    #[test]
    fn init_on_exhausted_arena_reports_oom() {
        let mut heap = SegHeap::new(VecArena::with_limit(64), AllocatorConfig::default());
        assert_eq!(
            heap.init(),
            Err(AllocError::OutOfMemory {
                requested: INIT_BYTES
            })
        );
        assert!(!heap.is_initialized());
    }

    #[test]
    fn init_on_non_empty_aligned_arena_offsets_the_heap() {
        let mut arena = VecArena::new();
        arena.grow_by(32).unwrap();
        let mut heap = SegHeap::new(arena, AllocatorConfig::default());
        heap.init().unwrap();
        assert_eq!(heap.heap_start(), 32);
        let ptr = heap.allocate(10).unwrap();
        assert_eq!(ptr, 32 + FIRST_BLOCK_OFFSET + WORD);
        assert_eq!(ptr % ALIGNMENT, 0);
        assert!(heap.check_consistency());
    }

    #[test]
    fn first_allocation_grows_from_the_sentinel() {
        let mut heap = heap();
        let ptr = heap.allocate(16).unwrap();
        assert_eq!(ptr, FIRST_BLOCK_OFFSET + WORD);
        assert_eq!(heap.arena().len(), INIT_BYTES + 32);
        assert_eq!(read_header(heap.arena(), FIRST_BLOCK_OFFSET).decode(), (24, true, true));
        let sentinel = heap.sentinel();
        assert_eq!(read_header(heap.arena(), sentinel).decode(), (0, true, true));
        assert_eq!(heap.stats().growths, 1);
    }

    #[test]
    fn zero_size_is_rejected_without_touching_the_arena() {
        let mut heap = heap();
        let before = heap.arena().bytes().to_vec();
        assert_eq!(heap.allocate(0), Err(AllocError::InvalidSize));
        assert_eq!(heap.arena().bytes(), &before[..]);
        assert_eq!(heap.arena().growth_attempts(), 1);
    }

    #[test]
    fn exact_class_takes_list_head() {
        let mut heap = heap();
        let a = heap.allocate(40).unwrap();
        let _guard = heap.allocate(40).unwrap();
        let b = heap.allocate(40).unwrap();
        let _guard2 = heap.allocate(40).unwrap();
        heap.release(a).unwrap();
        heap.release(b).unwrap();
        // LIFO: the most recently freed block comes back first.
        assert_eq!(heap.allocate(40).unwrap(), b);
        assert_eq!(heap.allocate(40).unwrap(), a);
        assert_eq!(heap.stats().exact_hits, 2);
    }

    #[test]
    fn range_class_prefers_the_smallest_fitting_block() {
        let mut heap = heap();
        let big = heap.allocate(1000).unwrap();
        let _g1 = heap.allocate(16).unwrap();
        let snug = heap.allocate(700).unwrap();
        let _g2 = heap.allocate(16).unwrap();
        let mid = heap.allocate(900).unwrap();
        let _g3 = heap.allocate(16).unwrap();
        heap.release(big).unwrap();
        heap.release(snug).unwrap();
        heap.release(mid).unwrap();

        // All three live in class 17; 600 fits all of them.
        let ptr = heap.allocate(600).unwrap();
        assert_eq!(ptr, snug);
        assert!(heap.check_consistency());
    }

    #[test]
    fn range_class_exact_match_short_circuits() {
        let mut heap = heap();
        let a = heap.allocate(700).unwrap();
        let _g1 = heap.allocate(16).unwrap();
        let b = heap.allocate(600).unwrap();
        let _g2 = heap.allocate(16).unwrap();
        heap.release(b).unwrap();
        heap.release(a).unwrap();
        let splits_before = heap.stats().splits;
        assert_eq!(heap.allocate(600).unwrap(), b);
        assert_eq!(heap.stats().splits, splits_before);
    }

    #[test]
    fn skip_sparse_bypasses_the_adjacent_class_once() {
        let mut heap = heap();
        // A free block of span 48 (class 2), fenced by allocations.
        let a = heap.allocate(40).unwrap();
        let _g = heap.allocate(8).unwrap();
        heap.release(a).unwrap();
        assert_eq!(class_of(48), 2);

        // Request span 32 (class 1): class 1 is empty, the search jumps to
        // class 3 and never sees class 2, so the heap grows.
        let growths = heap.stats().growths;
        let ptr = heap.allocate(24).unwrap();
        assert_ne!(ptr, a);
        assert_eq!(heap.stats().growths, growths + 1);
        assert!(heap.check_consistency());
    }

    #[test]
    fn sequential_policy_reaches_the_adjacent_class() {
        let config = AllocatorConfig::default().with_search(SearchPolicy::Sequential);
        let mut heap = SegHeap::new(VecArena::new(), config);
        heap.init().unwrap();
        let a = heap.allocate(40).unwrap();
        let _g = heap.allocate(8).unwrap();
        heap.release(a).unwrap();

        let growths = heap.stats().growths;
        let ptr = heap.allocate(24).unwrap();
        assert_eq!(ptr, a);
        assert_eq!(heap.stats().growths, growths);
        assert_eq!(heap.stats().splits, 1);
        assert!(heap.check_consistency());
    }

    #[test]
    fn split_remainder_is_linked_in_its_class() {
        let mut heap = heap();
        let a = heap.allocate(5000).unwrap();
        let _g = heap.allocate(16).unwrap();
        heap.release(a).unwrap();

        let b = heap.allocate(4000).unwrap();
        assert_eq!(b, a);
        let header = b - WORD;
        let remainder = header + WORD + 4008;
        let word = read_header(heap.arena(), remainder);
        assert_eq!(word.decode(), (5000 - 4008 - WORD, false, true));
        assert_eq!(
            heap.index.head(heap.arena(), class_of_size(word.size())),
            Some(remainder)
        );
        assert!(heap.check_consistency());
    }

    #[test]
    fn oversized_request_fails_after_one_growth_attempt() {
        let mut heap = SegHeap::new(VecArena::with_limit(4096), AllocatorConfig::default());
        heap.init().unwrap();
        let attempts = heap.arena().growth_attempts();
        let before = heap.arena().bytes().to_vec();
        assert_eq!(
            heap.allocate(1 << 20),
            Err(AllocError::OutOfMemory { requested: 1 << 20 })
        );
        assert_eq!(heap.arena().growth_attempts(), attempts + 1);
        assert_eq!(heap.arena().bytes(), &before[..]);
        assert!(heap.check_consistency());
    }

    #[test]
    fn unencodable_request_fails_without_growth() {
        let mut heap = heap();
        let attempts = heap.arena().growth_attempts();
        assert_eq!(
            heap.allocate(usize::MAX),
            Err(AllocError::OutOfMemory {
                requested: usize::MAX
            })
        );
        assert_eq!(heap.arena().growth_attempts(), attempts);
    }

    #[test]
    fn zeroed_allocate_clears_recycled_bytes() {
        let mut heap = heap();
        let a = heap.allocate(64).unwrap();
        heap.payload_mut(a).unwrap().fill(0xAB);
        let _g = heap.allocate(16).unwrap();
        heap.release(a).unwrap();

        let z = heap.zeroed_allocate(8, 8).unwrap();
        assert_eq!(z, a);
        assert!(heap.payload(z).unwrap()[..64].iter().all(|&b| b == 0));
    }

    #[test]
    fn zeroed_allocate_rejects_overflow() {
        let mut heap = heap();
        assert_eq!(
            heap.zeroed_allocate(usize::MAX, 2),
            Err(AllocError::SizeOverflow {
                count: usize::MAX,
                size: 2
            })
        );
        assert_eq!(heap.zeroed_allocate(0, 8), Err(AllocError::InvalidSize));
    }

    #[test]
    fn reset_turns_the_heap_into_one_free_block() {
        let mut heap = heap();
        for size in [16, 300, 5000, 40] {
            heap.allocate(size).unwrap();
        }
        let len = heap.arena().len();
        heap.reset().unwrap();
        assert_eq!(heap.arena().len(), len);
        let report = heap.check_heap().unwrap();
        assert_eq!(report.free_blocks, 1);
        assert_eq!(report.allocated_blocks, 0);
        assert_eq!(heap.stats(), HeapStats::default());

        // The whole region is reusable without growth.
        let ptr = heap.allocate(5000).unwrap();
        assert_eq!(ptr, FIRST_BLOCK_OFFSET + WORD);
        assert_eq!(heap.stats().growths, 0);
    }

    #[test]
    fn pointers_from_before_reset_are_rejected() {
        let mut heap = heap();
        let a = heap.allocate(48).unwrap();
        let b = heap.allocate(2000).unwrap();
        heap.reset().unwrap();

        assert_eq!(heap.release(b), Err(AllocError::DoubleFree { ptr: b }));
        assert_eq!(heap.usable_size(b), Err(AllocError::DoubleFree { ptr: b }));
        // `a` sat at the first block, which is now the free block's header.
        assert_eq!(heap.release(a), Err(AllocError::DoubleFree { ptr: a }));
        let report = heap.check_heap().unwrap();
        assert_eq!(report.free_blocks, 1);
        assert_eq!(report.allocated_blocks, 0);
    }

    #[test]
    fn undrained_lifecycle_log_stays_bounded() {
        let mut heap = heap();
        for _ in 0..3000 {
            let ptr = heap.allocate(64).unwrap();
            heap.release(ptr).unwrap();
        }
        assert!(heap.lifecycle_logs().len() <= crate::malloc::LIFECYCLE_LOG_CAPACITY);
        assert!(heap.dropped_lifecycle_records() > 0);
    }

    #[test]
    fn lifecycle_logs_cover_alloc_and_growth() {
        let mut heap = heap();
        let ptr = heap.allocate(64).unwrap();
        heap.release(ptr).unwrap();
        heap.allocate(64).unwrap();

        let logs = heap.drain_lifecycle_logs();
        assert!(logs.iter().all(|entry| entry.decision_id > 0));
        assert!(
            logs.iter()
                .all(|entry| entry.trace_id.starts_with("core::segalloc::"))
        );
        assert!(logs.iter().any(|entry| {
            entry.level == AllocatorLogLevel::Info && entry.event == "grow" && entry.ptr == Some(ptr)
        }));
        assert!(logs.iter().any(|entry| {
            entry.level == AllocatorLogLevel::Trace
                && entry.symbol == "malloc"
                && entry.details.starts_with("path=exact_class")
        }));
        assert!(heap.lifecycle_logs().is_empty());
    }

    #[test]
    fn quiet_config_records_nothing() {
        let mut heap = SegHeap::new(VecArena::new(), AllocatorConfig::quiet());
        heap.init().unwrap();
        let ptr = heap.allocate(64).unwrap();
        heap.release(ptr).unwrap();
        assert!(heap.lifecycle_logs().is_empty());
    }
}
