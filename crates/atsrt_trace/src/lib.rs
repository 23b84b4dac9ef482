#![doc = include_str!("../README.md")]

pub extern crate tracing;

/// Forwards to [`tracing::trace!`] when the calling crate enables its
/// `tracing` feature. Allocation paths should only ever log at this level.
#[macro_export]
macro_rules! trace {
    ($($tt:tt)*) => {
        if cfg!(feature = "tracing") {
            $crate::tracing::trace!($($tt)*);
        }
    };
}
