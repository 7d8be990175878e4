//! Size classes for the segregated free lists.
//!
//! Classes are indexed by block span (payload size plus header word):
//! - Classes 0-15: exact spans 16, 32, ..., 256. Every block in one of these
//!   lists has the same span, so any member is a perfect fit.
//! - Classes 16-22: power-of-two ranges, `(2^(k-1), 2^k]` for spans up to
//!   32 KiB. Members differ in size and must be compared.
//! - Class 23: every span above 32 KiB.

use super::block::{ALIGNMENT, WORD};

/// Number of free-list classes.
pub const NUM_CLASSES: usize = 24;

/// Classes below this index hold exactly one span each.
pub const EXACT_CLASSES: usize = 16;

/// Largest span served by an exact class.
pub const MAX_EXACT_SPAN: usize = 256;

/// Largest span served by a power-of-two range class.
pub const MAX_RANGE_SPAN: usize = 32 * 1024;

/// Catch-all class for spans above [`MAX_RANGE_SPAN`].
pub const LARGE_CLASS: usize = NUM_CLASSES - 1;

/// Maps a block span (multiple of 16) to its class index.
#[must_use]
pub const fn class_of(span: usize) -> usize {
    if span <= MAX_EXACT_SPAN {
        (span / ALIGNMENT).saturating_sub(1)
    } else if span <= MAX_RANGE_SPAN {
        ceil_log2(span) + 7
    } else {
        LARGE_CLASS
    }
}

/// Class of a block with the given payload size.
#[inline]
#[must_use]
pub const fn class_of_size(size: usize) -> usize {
    class_of(size + WORD)
}

/// Whether `class` holds a single span.
#[inline]
#[must_use]
pub const fn is_exact(class: usize) -> bool {
    class < EXACT_CLASSES
}

/// Payload size stored for a caller request of `request` bytes.
///
/// The span (`size + WORD`) is the request plus header rounded up to
/// [`ALIGNMENT`]. Returns `None` if the computation overflows.
#[must_use]
pub const fn align_request(request: usize) -> Option<usize> {
    let Some(padded) = request.checked_add(WORD + ALIGNMENT - 1) else {
        return None;
    };
    Some((padded / ALIGNMENT) * ALIGNMENT - WORD)
}

/// Inclusive span range a class accepts. Used by the heap checker and docs.
#[must_use]
pub const fn span_range(class: usize) -> (usize, usize) {
    if class < EXACT_CLASSES {
        let span = (class + 1) * ALIGNMENT;
        (span, span)
    } else if class < LARGE_CLASS {
        let k = class - 7;
        let low = if class == EXACT_CLASSES {
            MAX_EXACT_SPAN + ALIGNMENT
        } else {
            (1usize << (k - 1)) + ALIGNMENT
        };
        (low, 1usize << k)
    } else {
        (MAX_RANGE_SPAN + ALIGNMENT, usize::MAX)
    }
}

const fn ceil_log2(value: usize) -> usize {
    if value <= 1 {
        0
    } else {
        (usize::BITS - (value - 1).leading_zeros()) as usize
    }
}
