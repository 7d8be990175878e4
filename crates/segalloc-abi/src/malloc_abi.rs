//! C entry points over a process-wide [`SegAllocator`].
//!
//! Failures follow the C conventions: null plus `ENOMEM` for allocation
//! failures, `EINVAL` for a rejected pointer. Unlike libc `free`, rejected
//! pointers are never acted on.

use std::ffi::{c_int, c_void};

use segalloc_core::AllocError;

use crate::global::{DEFAULT_RESERVE_BYTES, SegAllocator};

static GLOBAL: SegAllocator = SegAllocator::new(DEFAULT_RESERVE_BYTES);

/// The allocator behind the `segalloc_*` symbols.
pub fn global() -> &'static SegAllocator {
    &GLOBAL
}

#[inline]
fn set_abi_errno(val: c_int) {
    // SAFETY: __errno_location returns a valid pointer to this thread's errno.
    unsafe { *libc::__errno_location() = val };
}

fn errno_for(err: AllocError) -> c_int {
    match err {
        AllocError::InvalidPointer { .. } | AllocError::DoubleFree { .. } => libc::EINVAL,
        AllocError::InvalidSize => libc::EINVAL,
        _ => libc::ENOMEM,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn segalloc_malloc(size: usize) -> *mut c_void {
    if size == 0 {
        return std::ptr::null_mut();
    }
    let ptr = GLOBAL.malloc(size);
    if ptr.is_null() {
        set_abi_errno(libc::ENOMEM);
    }
    ptr.cast()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn segalloc_calloc(nmemb: usize, size: usize) -> *mut c_void {
    if nmemb == 0 || size == 0 {
        return std::ptr::null_mut();
    }
    let ptr = GLOBAL.calloc(nmemb, size);
    if ptr.is_null() {
        set_abi_errno(libc::ENOMEM);
    }
    ptr.cast()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn segalloc_free(ptr: *mut c_void) {
    if let Err(err) = GLOBAL.free(ptr.cast()) {
        set_abi_errno(errno_for(err));
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn segalloc_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    match GLOBAL.realloc(ptr.cast(), size) {
        Ok(new_ptr) => new_ptr.cast(),
        Err(err) => {
            set_abi_errno(errno_for(err));
            std::ptr::null_mut()
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn segalloc_usable_size(ptr: *mut c_void) -> usize {
    if ptr.is_null() {
        return 0;
    }
    GLOBAL.usable_size(ptr.cast()).unwrap_or(0)
}

/// Returns 1 when the heap passes every consistency check, 0 otherwise.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn segalloc_check_heap() -> c_int {
    c_int::from(GLOBAL.check_heap().is_ok())
}
