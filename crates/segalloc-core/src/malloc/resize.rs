//! Resize engine.

use super::allocator::SegHeap;
use super::block::read_header;
use super::log::AllocatorLogLevel;
use super::size_class::{align_request, class_of_size};
use crate::arena::ArenaProvider;
use crate::error::AllocError;

impl<A: ArenaProvider> SegHeap<A> {
    /// Changes the size of the allocation at `ptr`.
    ///
    /// - `ptr == 0` behaves like [`allocate`](Self::allocate).
    /// - `new_size == 0` releases `ptr` and returns `None`.
    /// - A smaller size shrinks in place and frees the tail.
    /// - A larger size relocates: allocate, copy the old payload, release.
    ///   If the allocation fails the original block is left untouched.
    pub fn resize(&mut self, ptr: usize, new_size: usize) -> Result<Option<usize>, AllocError> {
        if ptr == 0 {
            return self.allocate_for("realloc", new_size).map(Some);
        }
        if new_size == 0 {
            self.release_for("realloc", ptr)?;
            return Ok(None);
        }

        let header = self.checked_header("realloc", ptr)?;
        let old_size = read_header(&self.arena, header).size();
        let Some(required) = align_request(new_size) else {
            self.record_lifecycle(
                AllocatorLogLevel::Warn,
                "realloc",
                "resize",
                Some(ptr),
                Some(new_size),
                None,
                "oom",
                format_args!("size_overflow"),
            );
            return Err(AllocError::OutOfMemory {
                requested: new_size,
            });
        };

        if required == old_size {
            return Ok(Some(ptr));
        }

        if required < old_size {
            self.split_allocated(header, required);
            self.record_lifecycle(
                AllocatorLogLevel::Trace,
                "realloc",
                "shrink",
                Some(ptr),
                Some(required),
                Some(class_of_size(required)),
                "success",
                format_args!("old_size={old_size}"),
            );
            return Ok(Some(ptr));
        }

        let new_ptr = self.allocate_for("realloc", new_size)?;
        self.arena.copy_within(ptr..ptr + old_size, new_ptr);
        self.free_block("realloc", header);
        self.record_lifecycle(
            AllocatorLogLevel::Trace,
            "realloc",
            "relocate",
            Some(new_ptr),
            Some(required),
            Some(class_of_size(required)),
            "success",
            format_args!("from={ptr} old_size={old_size} copied={old_size}"),
        );
        Ok(Some(new_ptr))
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::{ArenaProvider, VecArena};
    use crate::config::AllocatorConfig;
    use crate::error::AllocError;
    use crate::malloc::allocator::SegHeap;
    use crate::malloc::block::{WORD, read_header};

    fn heap() -> SegHeap<VecArena> {
        let mut heap = SegHeap::new(VecArena::new(), AllocatorConfig::default());
        heap.init().unwrap();
        heap
    }

    fn fill(heap: &mut SegHeap<VecArena>, ptr: usize, len: usize, seed: u8) {
        let payload = heap.payload_mut(ptr).unwrap();
        for (i, byte) in payload[..len].iter_mut().enumerate() {
            *byte = seed.wrapping_add(i as u8);
        }
    }

    fn verify(heap: &SegHeap<VecArena>, ptr: usize, len: usize, seed: u8) {
        let payload = heap.payload(ptr).unwrap();
        for (i, byte) in payload[..len].iter().enumerate() {
            assert_eq!(*byte, seed.wrapping_add(i as u8), "byte {i}");
        }
    }

    #[test]
    fn resize_null_allocates() {
        let mut heap = heap();
        let ptr = heap.resize(0, 100).unwrap().unwrap();
        assert!(heap.usable_size(ptr).unwrap() >= 100);
    }

    #[test]
    fn resize_to_zero_releases() {
        let mut heap = heap();
        let ptr = heap.allocate(100).unwrap();
        assert_eq!(heap.resize(ptr, 0), Ok(None));
        assert_eq!(heap.release(ptr), Err(AllocError::DoubleFree { ptr }));
    }

    #[test]
    fn resize_to_same_aligned_size_is_identity() {
        let mut heap = heap();
        let ptr = heap.allocate(100).unwrap();
        let before = heap.arena().len();
        assert_eq!(heap.resize(ptr, 104), Ok(Some(ptr)));
        assert_eq!(heap.resize(ptr, 97), Ok(Some(ptr)));
        assert_eq!(heap.arena().len(), before);
    }

    #[test]
    fn shrink_keeps_pointer_and_frees_tail() {
        let mut heap = heap();
        let ptr = heap.allocate(200).unwrap();
        let _g = heap.allocate(16).unwrap();
        fill(&mut heap, ptr, 200, 7);
        assert_eq!(heap.resize(ptr, 50), Ok(Some(ptr)));
        assert_eq!(heap.usable_size(ptr).unwrap(), 56);
        verify(&heap, ptr, 50, 7);

        let tail = ptr - WORD + 64;
        let word = read_header(heap.arena(), tail);
        assert!(!word.is_allocated());
        assert!(word.is_left_allocated());
        assert!(heap.check_consistency());
    }

    #[test]
    fn shrink_tail_merges_with_free_right_neighbour() {
        let mut heap = heap();
        let ptr = heap.allocate(200).unwrap();
        let right = heap.allocate(40).unwrap();
        let _g = heap.allocate(16).unwrap();
        heap.release(right).unwrap();
        heap.resize(ptr, 50).unwrap();
        let report = heap.check_heap().unwrap();
        assert_eq!(report.free_blocks, 1);
        let tail = ptr - WORD + 64;
        assert_eq!(read_header(heap.arena(), tail).size(), (200 - 56 - 8) + 48);
    }

    #[test]
    fn grow_relocates_and_preserves_bytes() {
        let mut heap = heap();
        let ptr = heap.allocate(40).unwrap();
        let _g = heap.allocate(16).unwrap();
        fill(&mut heap, ptr, 40, 0x30);
        let moved = heap.resize(ptr, 400).unwrap().unwrap();
        assert_ne!(moved, ptr);
        verify(&heap, moved, 40, 0x30);
        assert_eq!(heap.release(ptr), Err(AllocError::DoubleFree { ptr }));
        assert!(heap.check_consistency());
    }

    #[test]
    fn failed_grow_leaves_original_intact() {
        let mut heap = SegHeap::new(VecArena::with_limit(1024), AllocatorConfig::default());
        heap.init().unwrap();
        let ptr = heap.allocate(100).unwrap();
        fill(&mut heap, ptr, 100, 9);
        assert_eq!(
            heap.resize(ptr, 4096),
            Err(AllocError::OutOfMemory { requested: 4096 })
        );
        verify(&heap, ptr, 100, 9);
        assert_eq!(heap.usable_size(ptr).unwrap(), 104);
        assert!(heap.check_consistency());
    }

    #[test]
    fn resize_rejects_bad_pointers() {
        let mut heap = heap();
        let ptr = heap.allocate(40).unwrap();
        assert_eq!(
            heap.resize(ptr + 1, 10),
            Err(AllocError::InvalidPointer { ptr: ptr + 1 })
        );
        heap.release(ptr).unwrap();
        assert_eq!(heap.resize(ptr, 10), Err(AllocError::DoubleFree { ptr }));
        assert_eq!(heap.stats().rejected, 2);
    }

    #[test]
    fn resize_with_unencodable_size_fails_cleanly() {
        let mut heap = heap();
        let ptr = heap.allocate(40).unwrap();
        assert_eq!(
            heap.resize(ptr, usize::MAX),
            Err(AllocError::OutOfMemory {
                requested: usize::MAX
            })
        );
        assert_eq!(heap.usable_size(ptr).unwrap(), 40);
    }
}
