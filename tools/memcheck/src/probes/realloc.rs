use super::block::{Block, pattern_seed};
use super::{ProbeRun, Violation};
use crate::config::MemcheckConfig;

/// Size of the block kept alive while an unsatisfiable reallocation is
/// attempted on it.
const FAILURE_BLOCK_SIZE: usize = 64;

/// Resizes blocks between every pair of configured sizes, in both directions,
/// and checks that the common prefix survives.
///
/// Zero-size targets are skipped, since resizing to zero bytes may free the
/// block depending on the platform.
pub(crate) fn realloc_preserves(config: &MemcheckConfig, run: &mut ProbeRun) {
    let sizes = config.probe_sizes();

    for round in 0..config.rounds {
        let seed = pattern_seed(config.fill, round, 0);

        for &old_size in &sizes {
            for &new_size in sizes.iter().filter(|size| **size > 0 && **size != old_size) {
                run.ops(1);
                let Some(mut block) = Block::malloc(old_size) else {
                    if old_size > 0 {
                        run.violate(Violation::NullAllocation {
                            operation: "malloc",
                            size: old_size,
                        });
                    }

                    continue;
                };

                block.write_pattern(seed);

                run.ops(1);
                let block = match block.realloc(new_size) {
                    Ok(block) => block,
                    Err(block) => {
                        run.violate(Violation::NullAllocation {
                            operation: "realloc",
                            size: new_size,
                        });

                        block
                    }
                };

                if block.len() == new_size {
                    check_preserved(&block, seed, old_size, run);
                }

                drop(block);
                run.ops(1);
            }
        }
    }
}

/// Records a violation if `block`, resized from a block of `old_size` bytes
/// holding the pattern for `seed`, lost any byte of the common prefix.
pub(crate) fn check_preserved(block: &Block, seed: u8, old_size: usize, run: &mut ProbeRun) {
    let new_size = block.len();

    if let Some(offset) = block.pattern_mismatch(seed, old_size.min(new_size)) {
        run.violate(Violation::ContentLost {
            operation: "realloc",
            old_size,
            new_size,
            offset,
        });
    }
}

/// Resizes a null pointer to every non-zero configured size, which must
/// behave like a plain allocation.
pub(crate) fn realloc_from_null(config: &MemcheckConfig, run: &mut ProbeRun) {
    let sizes = config.probe_sizes();

    for _ in 0..config.rounds {
        for &size in sizes.iter().filter(|size| **size > 0) {
            run.ops(1);

            let Some(mut block) = Block::realloc_null(size) else {
                run.violate(Violation::NullAllocation {
                    operation: "realloc",
                    size,
                });

                continue;
            };

            block.fill(config.fill);

            if let Some(offset) = block.first_not(config.fill) {
                run.violate(Violation::ContentLost {
                    operation: "realloc",
                    old_size: 0,
                    new_size: size,
                    offset,
                });
            }

            drop(block);
            run.ops(1);
        }
    }
}

/// Attempts to grow a live block to a size no allocator can provide, then
/// checks that the original block is still intact and can be freed.
pub(crate) fn realloc_failure(config: &MemcheckConfig, run: &mut ProbeRun) {
    for _ in 0..config.rounds {
        run.ops(1);
        let Some(mut block) = Block::malloc(FAILURE_BLOCK_SIZE) else {
            run.violate(Violation::NullAllocation {
                operation: "malloc",
                size: FAILURE_BLOCK_SIZE,
            });

            continue;
        };

        block.write_pattern(config.fill);

        run.ops(1);
        let block = match block.realloc(usize::MAX) {
            Ok(block) => {
                run.violate(Violation::UnsatisfiableAccepted {
                    operation: "realloc",
                    size: usize::MAX,
                });

                // Never read a block that claims to span the address space.
                drop(block);
                run.ops(1);

                continue;
            }
            Err(block) => block,
        };

        if let Some(offset) = block.pattern_mismatch(config.fill, FAILURE_BLOCK_SIZE) {
            run.violate(Violation::ContentLost {
                operation: "realloc",
                old_size: FAILURE_BLOCK_SIZE,
                new_size: usize::MAX,
                offset,
            });
        }

        drop(block);
        run.ops(1);
    }
}
