//! Arena provider backed by one anonymous memory mapping.

use std::ops::Range;
use std::ptr::NonNull;

use segalloc_core::{ArenaError, ArenaProvider};

/// Reserves `capacity` bytes of address space once and hands them out front
/// to back as the heap grows. Pages are committed by the kernel on first
/// touch (`MAP_NORESERVE`), and the mapping is released on drop.
pub struct MmapArena {
    base: NonNull<u8>,
    len: usize,
    capacity: usize,
}

// SAFETY: the mapping is owned exclusively by this value and is only reached
// through `&self` / `&mut self`.
unsafe impl Send for MmapArena {}

fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw > 0 { raw as usize } else { 4096 }
}

impl MmapArena {
    /// Maps `capacity` bytes (rounded up to whole pages) of zeroed, private
    /// memory.
    pub fn new(capacity: usize) -> Result<Self, ArenaError> {
        let page = page_size();
        let capacity = capacity
            .max(1)
            .checked_next_multiple_of(page)
            .ok_or(ArenaError::MapFailed {
                errno: libc::ENOMEM,
            })?;
        // SAFETY: anonymous private mapping with no fixed address; the kernel
        // picks a fresh range that nothing else references.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            let errno = std::io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::ENOMEM);
            return Err(ArenaError::MapFailed { errno });
        }
        let base = NonNull::new(raw.cast::<u8>()).ok_or(ArenaError::MapFailed {
            errno: libc::ENOMEM,
        })?;
        Ok(Self {
            base,
            len: 0,
            capacity,
        })
    }

    /// Bytes reserved for this arena.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Address of arena offset 0.
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Address of `offset`, or null when `offset` is 0.
    pub fn ptr_at(&self, offset: usize) -> *mut u8 {
        if offset == 0 {
            std::ptr::null_mut()
        } else {
            self.base.as_ptr().wrapping_add(offset)
        }
    }

    /// Arena offset of `ptr`. Null maps to 0; addresses outside the
    /// reservation map to `None`.
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        if ptr.is_null() {
            return Some(0);
        }
        let addr = ptr as usize;
        let base = self.base_addr();
        (addr >= base && addr < base + self.capacity).then(|| addr - base)
    }

    /// Address of `range`, after checking it lies inside the grown region.
    fn span_ptr(&self, range: &Range<usize>) -> *mut u8 {
        assert!(
            range.start <= range.end && range.end <= self.len,
            "arena range {range:?} outside 0..{}",
            self.len
        );
        self.base.as_ptr().wrapping_add(range.start)
    }
}

impl ArenaProvider for MmapArena {
    fn len(&self) -> usize {
        self.len
    }

    fn grow_by(&mut self, n: usize) -> Result<usize, ArenaError> {
        let available = self.capacity - self.len;
        if n > available {
            return Err(ArenaError::Exhausted {
                requested: n,
                available,
            });
        }
        let old_top = self.len;
        self.len += n;
        Ok(old_top)
    }

    /// Whole-arena view. Callers must ensure no payload pointer handed out
    /// from this arena is in use by another thread.
    fn bytes(&self) -> &[u8] {
        // SAFETY: the first `len` bytes lie inside the live mapping, which is
        // readable, writable and initialised to zero by the kernel.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `bytes`; `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    // The accessors below never form a reference over the mapping: live
    // payloads are written through raw pointers by other threads while the
    // heap lock is held.

    fn read_word(&self, offset: usize) -> u64 {
        let ptr = self.span_ptr(&(offset..offset + 8));
        // SAFETY: `span_ptr` checked the 8 bytes are inside the mapping.
        unsafe { ptr.cast::<u64>().read_unaligned() }
    }

    fn write_word(&mut self, offset: usize, value: u64) {
        let ptr = self.span_ptr(&(offset..offset + 8));
        // SAFETY: as in `read_word`.
        unsafe { ptr.cast::<u64>().write_unaligned(value) }
    }

    fn fill_zero(&mut self, range: Range<usize>) {
        let ptr = self.span_ptr(&range);
        // SAFETY: the range is inside the mapping.
        unsafe { std::ptr::write_bytes(ptr, 0, range.len()) }
    }

    fn copy_within(&mut self, src: Range<usize>, dst: usize) {
        let from = self.span_ptr(&src);
        let to = self.span_ptr(&(dst..dst + src.len()));
        // SAFETY: both ranges are inside the mapping; `copy` allows overlap.
        unsafe { std::ptr::copy(from, to, src.len()) }
    }
}

impl Drop for MmapArena {
    fn drop(&mut self) {
        // SAFETY: `base`/`capacity` describe exactly the mapping created in
        // `new`, and no borrow of it can outlive `self`.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.capacity);
        }
    }
}

impl std::fmt::Debug for MmapArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapArena")
            .field("base", &format_args!("{:#x}", self.base_addr()))
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_within_reservation_and_keeps_base() {
        let mut arena = MmapArena::new(1 << 20).unwrap();
        assert!(arena.is_empty());
        assert_eq!(arena.base_addr() % page_size(), 0);
        let base = arena.base_addr();
        assert_eq!(arena.grow_by(208), Ok(0));
        assert_eq!(arena.grow_by(4096), Ok(208));
        assert_eq!(arena.len(), 4304);
        assert_eq!(arena.base_addr(), base);
        assert!(arena.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn exhaustion_leaves_length_unchanged() {
        let mut arena = MmapArena::new(1).unwrap();
        let capacity = arena.capacity();
        assert_eq!(capacity, page_size());
        arena.grow_by(capacity - 16).unwrap();
        assert_eq!(
            arena.grow_by(32),
            Err(ArenaError::Exhausted {
                requested: 32,
                available: 16
            })
        );
        assert_eq!(arena.len(), capacity - 16);
    }

    #[test]
    fn offsets_and_addresses_convert_both_ways() {
        let mut arena = MmapArena::new(1 << 16).unwrap();
        arena.grow_by(1024).unwrap();
        let ptr = arena.ptr_at(208);
        assert_eq!(arena.offset_of(ptr), Some(208));
        assert!(arena.ptr_at(0).is_null());
        assert_eq!(arena.offset_of(std::ptr::null()), Some(0));
        let outside = arena.base_addr() + arena.capacity() + 64;
        assert_eq!(arena.offset_of(outside as *const u8), None);
    }

    #[test]
    fn writes_are_visible_through_the_address() {
        let mut arena = MmapArena::new(1 << 16).unwrap();
        arena.grow_by(64).unwrap();
        arena.write_word(16, 0xA5A5);
        let ptr = arena.ptr_at(16).cast::<u64>();
        // SAFETY: offset 16 is inside the grown region and 8-byte aligned.
        assert_eq!(unsafe { ptr.read() }, 0xA5A5);
    }

    #[test]
    fn ranged_accessors_work_through_raw_addresses() {
        let mut arena = MmapArena::new(1 << 16).unwrap();
        arena.grow_by(256).unwrap();
        let base = arena.ptr_at(64);
        // SAFETY: offsets 64..192 are inside the grown region.
        unsafe { std::ptr::write_bytes(base, 0x5A, 128) };

        arena.fill_zero(80..96);
        arena.write_word(64, 0x1122_3344_5566_7788);
        arena.copy_within(64..72, 128);
        assert_eq!(arena.read_word(128), 0x1122_3344_5566_7788);
        // SAFETY: as above.
        let bytes = unsafe { std::slice::from_raw_parts(base, 128) };
        assert!(bytes[16..32].iter().all(|&b| b == 0));
        assert_eq!(bytes[15], 0x5A);
        assert_eq!(bytes[32], 0x5A);
        assert_eq!(bytes[72], 0x5A);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn word_access_past_the_grown_region_panics() {
        let mut arena = MmapArena::new(1 << 16).unwrap();
        arena.grow_by(64).unwrap();
        arena.read_word(60);
    }
}
