use std::ffi::c_void;
use std::ptr::NonNull;

use atsrt_memalloc::mem::{atsrt_calloc, atsrt_malloc, atsrt_mfree, atsrt_realloc};

/// A memory block owned by the probe, obtained through the exported
/// allocation symbols and released through `atsruntime_mfree_undef` on drop.
///
/// `len` is the size that was requested, which may be less than what the
/// allocator actually reserved.
#[derive(Debug)]
pub(crate) struct Block {
    ptr: NonNull<c_void>,
    len: usize,
}

impl Block {
    /// Takes ownership of a pointer returned by one of the exports.
    ///
    /// Returns [`None`] if the pointer is null.
    fn from_raw(ptr: *mut c_void, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Block { ptr, len })
    }

    pub(crate) fn malloc(size: usize) -> Option<Self> {
        Self::from_raw(unsafe { atsrt_malloc(size) }, size)
    }

    /// Allocates a zeroed block of `count * elem_size` bytes.
    ///
    /// If the product overflows, a returned block is tracked with a length of
    /// zero, so it is never read.
    pub(crate) fn calloc(count: usize, elem_size: usize) -> Option<Self> {
        let len = count.checked_mul(elem_size).unwrap_or(0);

        Self::from_raw(unsafe { atsrt_calloc(count, elem_size) }, len)
    }

    /// Resizes a null pointer, which must behave like [`Block::malloc`].
    pub(crate) fn realloc_null(size: usize) -> Option<Self> {
        Self::from_raw(unsafe { atsrt_realloc(std::ptr::null_mut(), size) }, size)
    }

    /// Resizes the block to `new_size` bytes.
    ///
    /// On failure, the original block is handed back untouched. `new_size`
    /// must be non-zero, since resizing to zero bytes may free the block
    /// depending on the platform.
    pub(crate) fn realloc(self, new_size: usize) -> Result<Self, Self> {
        debug_assert!(new_size > 0, "zero-size reallocation is platform-defined");

        let new_ptr = unsafe { atsrt_realloc(self.ptr.as_ptr(), new_size) };

        match NonNull::new(new_ptr) {
            Some(ptr) => {
                // The old pointer now belongs to the allocator.
                std::mem::forget(self);

                Ok(Block { ptr, len: new_size })
            }
            None => Err(self),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }

    /// Overwrites every byte of the block with `byte`.
    pub(crate) fn fill(&mut self, byte: u8) {
        self.as_mut_slice().fill(byte);
    }

    /// Writes a position-dependent pattern into the block, seeded by `seed`.
    pub(crate) fn write_pattern(&mut self, seed: u8) {
        for (offset, byte) in self.as_mut_slice().iter_mut().enumerate() {
            *byte = pattern_byte(seed, offset);
        }
    }

    /// Finds the first offset below `len` where the block deviates from the
    /// pattern written by [`Block::write_pattern`].
    pub(crate) fn pattern_mismatch(&self, seed: u8, len: usize) -> Option<usize> {
        self.as_slice()[..len.min(self.len)]
            .iter()
            .enumerate()
            .position(|(offset, byte)| *byte != pattern_byte(seed, offset))
    }

    /// Finds the first offset whose byte differs from `byte`.
    pub(crate) fn first_not(&self, byte: u8) -> Option<usize> {
        self.as_slice().iter().position(|b| *b != byte)
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        unsafe { atsrt_mfree(self.ptr.as_ptr()) };
    }
}

// Blocks are only ever touched by the thread which owns them.
unsafe impl Send for Block {}

#[allow(clippy::cast_possible_truncation)]
fn pattern_byte(seed: u8, offset: usize) -> u8 {
    seed ^ (offset % 251) as u8
}

/// Derives the pattern seed for a round of a worker. Only the low byte of
/// `round` and `worker` takes part.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn pattern_seed(fill: u8, round: usize, worker: usize) -> u8 {
    fill ^ (round as u8) ^ (worker as u8).wrapping_mul(31)
}
