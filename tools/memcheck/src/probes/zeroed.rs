use super::block::Block;
use super::{ProbeRun, Violation};
use crate::config::MemcheckConfig;

/// Requests whose `count * elem_size` overflows a `usize`.
const OVERFLOWING_REQUESTS: [(usize, usize); 3] = [
    (usize::MAX, 2),
    (2, usize::MAX / 2 + 1),
    (usize::MAX / 16 + 1, 16),
];

/// Allocates zeroed blocks for every configured `[count, elem_size]` pair and
/// checks that they hold nothing but zeroes.
///
/// Before each request a block of the same size is dirtied and freed, so the
/// allocator is likely to hand the dirty memory back.
pub(crate) fn zeroed_alloc(config: &MemcheckConfig, run: &mut ProbeRun) {
    let pairs = config.zeroed_pairs();

    for _ in 0..config.rounds {
        for &(count, elem_size) in &pairs {
            let len = count * elem_size;

            if let Some(mut dirty) = Block::malloc(len) {
                dirty.fill(0xFF);
                drop(dirty);
                run.ops(2);
            }

            run.ops(1);
            let Some(block) = Block::calloc(count, elem_size) else {
                if len > 0 {
                    run.violate(Violation::NullAllocation {
                        operation: "calloc",
                        size: len,
                    });
                }

                continue;
            };

            check_zeroed(&block, count, elem_size, run);

            drop(block);
            run.ops(1);
        }
    }
}

/// Records a violation if `block`, returned for `count * elem_size` bytes of
/// zeroed memory, holds any non-zero byte.
pub(crate) fn check_zeroed(block: &Block, count: usize, elem_size: usize, run: &mut ProbeRun) {
    if let Some(offset) = block.first_not(0) {
        run.violate(Violation::NotZeroed {
            count,
            elem_size,
            offset,
        });
    }
}

/// Requests zeroed blocks whose total size overflows, which must all fail.
pub(crate) fn zeroed_overflow(_config: &MemcheckConfig, run: &mut ProbeRun) {
    for (count, elem_size) in OVERFLOWING_REQUESTS {
        run.ops(1);

        if let Some(block) = Block::calloc(count, elem_size) {
            run.violate(Violation::OverflowAccepted { count, elem_size });

            drop(block);
            run.ops(1);
        }
    }
}
