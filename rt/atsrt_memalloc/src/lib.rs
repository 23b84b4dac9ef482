//! Memory-allocation symbols required when linking ATS programs against
//! `libatslib`.
//!
//! The library expects the program to provide its own `atsruntime_*_undef`
//! allocation functions. Linking this crate (as a static or dynamic library)
//! provides them, backed by the host `libc` allocator.

pub mod mem;

/// Every allocation symbol exported by this crate, paired with the address of
/// the function it resolves to.
pub const MEMALLOC_FUNCTIONS: &[(&str, *const u8)] = &[
    ("atsruntime_mfree_undef", mem::atsrt_mfree as *const u8),
    ("atsruntime_malloc_undef", mem::atsrt_malloc as *const u8),
    ("atsruntime_calloc_undef", mem::atsrt_calloc as *const u8),
    ("atsruntime_realloc_undef", mem::atsrt_realloc as *const u8),
];
