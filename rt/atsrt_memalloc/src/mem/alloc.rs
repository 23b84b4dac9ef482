use std::ffi::c_void;

/// Releases a memory block, so that it can be used for future allocations.
///
/// Passing a null pointer does nothing.
///
/// # Safety
///
/// `ptr` must either be null or a pointer returned by [`atsrt_malloc`],
/// [`atsrt_calloc`] or [`atsrt_realloc`] which has not been released yet.
#[unsafe(export_name = "atsruntime_mfree_undef")]
pub unsafe extern "C" fn atsrt_mfree(ptr: *mut c_void) {
    atsrt_trace::trace!(ptr = ?ptr, "mfree");

    unsafe { libc::free(ptr) }
}

/// Allocates the given amount of bytes using the host allocator.
///
/// The returned memory block may be larger than the requested size and its
/// content is not initialized. Returns null if the request cannot be
/// satisfied.
///
/// # Safety
///
/// The returned block must be released with [`atsrt_mfree`] or resized with
/// [`atsrt_realloc`], never with any other allocator.
#[unsafe(export_name = "atsruntime_malloc_undef")]
pub unsafe extern "C" fn atsrt_malloc(size: usize) -> *mut c_void {
    let ptr = unsafe { libc::malloc(size) };
    atsrt_trace::trace!(size, ptr = ?ptr, "malloc");

    ptr
}

/// Allocates a zeroed memory block large enough to hold `count` elements of
/// `elem_size` bytes each.
///
/// Returns null if the request cannot be satisfied, including when
/// `count * elem_size` overflows.
///
/// # Safety
///
/// Same as [`atsrt_malloc`].
#[unsafe(export_name = "atsruntime_calloc_undef")]
pub unsafe extern "C" fn atsrt_calloc(count: usize, elem_size: usize) -> *mut c_void {
    let ptr = unsafe { libc::calloc(count, elem_size) };
    atsrt_trace::trace!(count, elem_size, ptr = ?ptr, "calloc");

    ptr
}

/// Resizes an existing memory block, so that it is at least `new_size` bytes
/// long.
///
/// The content is identical to the original block, up until the smaller of
/// the two sizes. A null `ptr` makes this equivalent to [`atsrt_malloc`].
///
/// On failure, null is returned and the original block is left untouched and
/// still owned by the caller.
///
/// # Safety
///
/// `ptr` must either be null or a live pointer from one of the allocation
/// functions in this module. On success, `ptr` must not be used again.
#[unsafe(export_name = "atsruntime_realloc_undef")]
pub unsafe extern "C" fn atsrt_realloc(ptr: *mut c_void, new_size: usize) -> *mut c_void {
    let new_ptr = unsafe { libc::realloc(ptr, new_size) };
    atsrt_trace::trace!(ptr = ?ptr, new_size, new_ptr = ?new_ptr, "realloc");

    new_ptr
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    fn fill(ptr: *mut c_void, len: usize, byte: u8) {
        unsafe { ptr.cast::<u8>().write_bytes(byte, len) };
    }

    fn bytes<'a>(ptr: *mut c_void, len: usize) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) }
    }

    #[test]
    fn malloc_then_free() {
        for size in [1, 7, 16, 255, 4096, 1 << 20] {
            let ptr = unsafe { atsrt_malloc(size) };
            assert!(!ptr.is_null(), "allocation of {size} bytes failed");

            fill(ptr, size, 0xA5);
            assert!(bytes(ptr, size).iter().all(|b| *b == 0xA5));

            unsafe { atsrt_mfree(ptr) };
        }
    }

    #[test]
    fn malloc_zero_size_is_freeable() {
        let ptr = unsafe { atsrt_malloc(0) };

        unsafe { atsrt_mfree(ptr) };
    }

    #[test]
    fn mfree_null_is_noop() {
        unsafe { atsrt_mfree(ptr::null_mut()) };
    }

    #[test]
    fn calloc_returns_zeroed_block() {
        // Dirty a block first, so the zeroed allocation is likely to reuse it.
        let dirty = unsafe { atsrt_malloc(512) };
        fill(dirty, 512, 0xFF);
        unsafe { atsrt_mfree(dirty) };

        let ptr = unsafe { atsrt_calloc(64, 8) };
        assert!(!ptr.is_null());
        assert!(bytes(ptr, 512).iter().all(|b| *b == 0));

        unsafe { atsrt_mfree(ptr) };
    }

    #[test]
    fn calloc_overflow_returns_null() {
        let ptr = unsafe { atsrt_calloc(usize::MAX, 2) };
        assert!(ptr.is_null());

        let ptr = unsafe { atsrt_calloc(2, usize::MAX / 2 + 1) };
        assert!(ptr.is_null());
    }

    #[test]
    fn realloc_grow_preserves_prefix() {
        let ptr = unsafe { atsrt_malloc(32) };
        for (idx, byte) in unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), 32) }
            .iter_mut()
            .enumerate()
        {
            *byte = idx as u8;
        }

        let grown = unsafe { atsrt_realloc(ptr, 8192) };
        assert!(!grown.is_null());
        assert_eq!(bytes(grown, 32), (0..32).collect::<Vec<u8>>());

        unsafe { atsrt_mfree(grown) };
    }

    #[test]
    fn realloc_shrink_preserves_prefix() {
        let ptr = unsafe { atsrt_malloc(4096) };
        fill(ptr, 4096, 0x3C);

        let shrunk = unsafe { atsrt_realloc(ptr, 24) };
        assert!(!shrunk.is_null());
        assert!(bytes(shrunk, 24).iter().all(|b| *b == 0x3C));

        unsafe { atsrt_mfree(shrunk) };
    }

    #[test]
    fn realloc_null_allocates() {
        let ptr = unsafe { atsrt_realloc(ptr::null_mut(), 128) };
        assert!(!ptr.is_null());

        fill(ptr, 128, 1);
        unsafe { atsrt_mfree(ptr) };
    }

    #[test]
    fn realloc_failure_keeps_original() {
        let ptr = unsafe { atsrt_malloc(64) };
        fill(ptr, 64, 0x42);

        let failed = unsafe { atsrt_realloc(ptr, usize::MAX) };
        assert!(failed.is_null());
        assert!(bytes(ptr, 64).iter().all(|b| *b == 0x42));

        unsafe { atsrt_mfree(ptr) };
    }
}
