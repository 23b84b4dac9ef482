use atsrt_memalloc::mem::atsrt_mfree;

use super::block::Block;
use super::{ProbeRun, Violation};
use crate::config::MemcheckConfig;

/// Allocates every configured size, writes through the whole block, reads it
/// back and frees it again.
///
/// A zero-size request may return either null or a unique pointer.
pub(crate) fn alloc_free(config: &MemcheckConfig, run: &mut ProbeRun) {
    let sizes = config.probe_sizes();

    for _ in 0..config.rounds {
        for &size in &sizes {
            run.ops(1);

            let Some(mut block) = Block::malloc(size) else {
                if size > 0 {
                    run.violate(Violation::NullAllocation {
                        operation: "malloc",
                        size,
                    });
                }

                continue;
            };

            block.fill(config.fill);

            if let Some(offset) = block.first_not(config.fill) {
                run.violate(Violation::ContentLost {
                    operation: "malloc",
                    old_size: size,
                    new_size: size,
                    offset,
                });
            }

            drop(block);
            run.ops(1);
        }
    }
}

/// Frees a null pointer once per round.
pub(crate) fn free_null(config: &MemcheckConfig, run: &mut ProbeRun) {
    for _ in 0..config.rounds {
        unsafe { atsrt_mfree(std::ptr::null_mut()) };
        run.ops(1);
    }
}
