//! Arena providers.
//!
//! The engine sees its arena as a flat byte range addressed from offset 0.
//! A provider owns the backing storage and can only ever grow it; the engine
//! never assumes anything about bytes past [`ArenaProvider::len`].
//!
//! Allocation paths touch the arena only through the word accessors,
//! [`ArenaProvider::fill_zero`] and [`ArenaProvider::copy_within`]. The
//! whole-arena views are for tests, payload inspection and debugging tools.

use std::ops::Range;

use crate::error::ArenaError;

/// Default upper bound for [`VecArena`] (64 MiB).
pub const DEFAULT_VEC_ARENA_LIMIT: usize = 64 * 1024 * 1024;

/// Source of the contiguous, monotonically growing byte range the allocator
/// manages.
pub trait ArenaProvider {
    /// Current arena length in bytes.
    fn len(&self) -> usize;

    /// Extends the arena by `n` bytes and returns the previous top offset.
    ///
    /// On failure the arena is left untouched.
    fn grow_by(&mut self, n: usize) -> Result<usize, ArenaError>;

    /// Read-only view of the whole arena.
    ///
    /// Providers whose memory is handed out as raw pointers must not be
    /// viewed this way while other threads use their payloads.
    fn bytes(&self) -> &[u8];

    /// Mutable view of the whole arena. Same caveat as [`bytes`](Self::bytes).
    fn bytes_mut(&mut self) -> &mut [u8];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest valid offset. Offsets are arena-relative, so this is always 0.
    fn bounds_low(&self) -> usize {
        0
    }

    /// Offset of the last valid byte, or `None` for an empty arena.
    fn bounds_high(&self) -> Option<usize> {
        self.len().checked_sub(1)
    }

    /// Reads the native-endian 64-bit word at `offset`.
    fn read_word(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes()[offset..offset + 8]);
        u64::from_ne_bytes(buf)
    }

    /// Writes a native-endian 64-bit word at `offset`.
    fn write_word(&mut self, offset: usize, value: u64) {
        self.bytes_mut()[offset..offset + 8].copy_from_slice(&value.to_ne_bytes());
    }

    /// Zeroes `range`.
    fn fill_zero(&mut self, range: Range<usize>) {
        self.bytes_mut()[range].fill(0);
    }

    /// Copies the bytes in `src` to `dst`. The two regions may overlap.
    fn copy_within(&mut self, src: Range<usize>, dst: usize) {
        self.bytes_mut().copy_within(src, dst);
    }
}

/// Heap-backed arena with a hard size limit.
///
/// Storage may move when it grows; that is harmless because the engine only
/// stores offsets. Used by tests, the trace driver and benchmarks.
#[derive(Debug, Clone)]
pub struct VecArena {
    bytes: Vec<u8>,
    limit: usize,
    growth_attempts: u64,
}

impl VecArena {
    /// Creates an empty arena bounded by [`DEFAULT_VEC_ARENA_LIMIT`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_VEC_ARENA_LIMIT)
    }

    /// Creates an empty arena that refuses to grow past `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            growth_attempts: 0,
        }
    }

    /// Maximum size this arena will grow to.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of `grow_by` calls, successful or not.
    pub fn growth_attempts(&self) -> u64 {
        self.growth_attempts
    }
}

impl Default for VecArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaProvider for VecArena {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn grow_by(&mut self, n: usize) -> Result<usize, ArenaError> {
        self.growth_attempts += 1;
        let old_top = self.bytes.len();
        let available = self.limit.saturating_sub(old_top);
        if n > available {
            return Err(ArenaError::Exhausted {
                requested: n,
                available,
            });
        }
        self.bytes.resize(old_top + n, 0);
        Ok(old_top)
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
