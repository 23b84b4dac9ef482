pub mod alloc;

pub use alloc::*;
