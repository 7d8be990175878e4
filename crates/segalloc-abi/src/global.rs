//! Lock-wrapped heap usable as a process allocator.

use std::alloc::{GlobalAlloc, Layout};

use parking_lot::Mutex;
use segalloc_core::{AllocError, AllocatorConfig, HeapReport, SegHeap};

use crate::config::search_policy;
use crate::mmap_arena::MmapArena;

/// Address space reserved by [`SegAllocator::new`] callers that have no
/// better estimate (1 GiB, committed lazily).
pub const DEFAULT_RESERVE_BYTES: usize = 1 << 30;

/// Largest alignment the engine guarantees.
pub const MAX_ALIGN: usize = 16;

/// One segregated heap behind one mutex.
///
/// The heap and its mapping are created on first use. Lifecycle logging is
/// always off here because recording allocates.
pub struct SegAllocator {
    reserve: usize,
    verify_release: bool,
    heap: Mutex<Option<SegHeap<MmapArena>>>,
}

impl SegAllocator {
    /// An allocator that will reserve `reserve` bytes on first use.
    pub const fn new(reserve: usize) -> Self {
        Self {
            reserve,
            verify_release: false,
            heap: parking_lot::const_mutex(None),
        }
    }

    /// Like [`SegAllocator::new`], but every `free` and `realloc` walks the
    /// heap to confirm the pointer names a block start.
    pub const fn verifying(reserve: usize) -> Self {
        Self {
            reserve,
            verify_release: true,
            heap: parking_lot::const_mutex(None),
        }
    }

    /// Runs `f` on the heap, creating it first if needed.
    fn with_heap<R>(
        &self,
        f: impl FnOnce(&mut SegHeap<MmapArena>) -> Result<R, AllocError>,
    ) -> Result<R, AllocError> {
        // Resolve before locking: reading the environment may allocate.
        let search = search_policy();
        let mut guard = self.heap.lock();
        if guard.is_none() {
            let arena = MmapArena::new(self.reserve).map_err(|_| AllocError::OutOfMemory {
                requested: self.reserve,
            })?;
            let config = AllocatorConfig::quiet()
                .with_search(search)
                .with_release_verification(self.verify_release);
            let mut heap = SegHeap::new(arena, config);
            heap.init()?;
            *guard = Some(heap);
        }
        match guard.as_mut() {
            Some(heap) => f(heap),
            None => Err(AllocError::NotInitialized),
        }
    }

    fn offset_of(heap: &SegHeap<MmapArena>, ptr: *const u8) -> Result<usize, AllocError> {
        heap.arena().offset_of(ptr).ok_or(AllocError::InvalidPointer {
            ptr: ptr as usize,
        })
    }

    /// Allocates `size` bytes aligned to 16. Null on failure or `size == 0`.
    pub fn malloc(&self, size: usize) -> *mut u8 {
        self.with_heap(|heap| heap.allocate(size).map(|off| heap.arena().ptr_at(off)))
            .unwrap_or(std::ptr::null_mut())
    }

    /// Allocates `count * size` zeroed bytes. Null on overflow or failure.
    pub fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        self.with_heap(|heap| {
            heap.zeroed_allocate(count, size)
                .map(|off| heap.arena().ptr_at(off))
        })
        .unwrap_or(std::ptr::null_mut())
    }

    /// Releases `ptr`. Null is a no-op. Pointers outside the mapping,
    /// misaligned ones and already-free blocks are rejected and leave the
    /// heap untouched. Interior pointers are only caught reliably by an
    /// allocator built with [`SegAllocator::verifying`].
    pub fn free(&self, ptr: *mut u8) -> Result<(), AllocError> {
        if ptr.is_null() {
            return Ok(());
        }
        self.with_heap(|heap| {
            let offset = Self::offset_of(heap, ptr)?;
            heap.release(offset)
        })
    }

    /// Resizes `ptr` to `size` bytes. Returns null after a release
    /// (`size == 0`) and on failure, in which case `ptr` stays valid.
    pub fn realloc(&self, ptr: *mut u8, size: usize) -> Result<*mut u8, AllocError> {
        self.with_heap(|heap| {
            let offset = Self::offset_of(heap, ptr)?;
            let resized = heap.resize(offset, size)?;
            Ok(resized.map_or(std::ptr::null_mut(), |off| heap.arena().ptr_at(off)))
        })
    }

    /// Usable bytes behind a live allocation.
    pub fn usable_size(&self, ptr: *const u8) -> Result<usize, AllocError> {
        self.with_heap(|heap| {
            let offset = Self::offset_of(heap, ptr)?;
            heap.usable_size(offset)
        })
    }

    /// Runs the heap checker.
    pub fn check_heap(&self) -> Result<HeapReport, AllocError> {
        self.with_heap(|heap| heap.check_heap())
    }
}

unsafe impl GlobalAlloc for SegAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > MAX_ALIGN {
            return std::ptr::null_mut();
        }
        self.malloc(layout.size().max(1))
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > MAX_ALIGN {
            return std::ptr::null_mut();
        }
        self.calloc(1, layout.size().max(1))
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // Nothing to report to: a rejected pointer is simply not freed.
        let _ = self.free(ptr);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > MAX_ALIGN {
            return std::ptr::null_mut();
        }
        SegAllocator::realloc(self, ptr, new_size.max(1)).unwrap_or(std::ptr::null_mut())
    }
}
