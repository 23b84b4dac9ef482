use std::collections::VecDeque;

use super::block::{Block, pattern_seed};
use super::{ProbeRun, Violation};
use crate::config::MemcheckConfig;

/// Amount of blocks each worker keeps alive at once, so frees interleave
/// with allocations made by other workers.
const LIVE_BLOCKS: usize = 8;

/// Spawns `threads` workers which allocate, resize and free blocks at the
/// same time. Every block is owned by a single worker, so any change to its
/// content means the allocator handed out overlapping memory.
///
/// Workers the OS refuses to start are logged and skipped.
pub(crate) fn concurrent(config: &MemcheckConfig, run: &mut ProbeRun) {
    let sizes = config
        .probe_sizes()
        .into_iter()
        .filter(|size| *size > 0)
        .collect::<Vec<_>>();

    std::thread::scope(|scope| {
        let workers = (0..config.threads)
            .filter_map(|worker| {
                let sizes = &sizes;

                let spawned = std::thread::Builder::new()
                    .name(format!("memcheck-worker-{worker}"))
                    .spawn_scoped(scope, move || {
                        let mut local = ProbeRun::default();
                        worker_loop(worker, sizes, config, &mut local);

                        local
                    });

                match spawned {
                    Ok(handle) => Some((worker, handle)),
                    Err(err) => {
                        tracing::warn!(worker, error = %err, "could not spawn worker thread");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        for (worker, handle) in workers {
            match handle.join() {
                Ok(local) => run.merge(local),
                Err(_) => run.violate(Violation::WorkerPanicked { worker }),
            }
        }
    });
}

fn worker_loop(worker: usize, sizes: &[usize], config: &MemcheckConfig, run: &mut ProbeRun) {
    let mut live: VecDeque<(Block, u8, usize)> = VecDeque::with_capacity(LIVE_BLOCKS + 1);

    for round in 0..config.rounds {
        for &size in sizes {
            let seed = pattern_seed(config.fill, round, worker);

            run.ops(1);
            let Some(mut block) = Block::malloc(size) else {
                run.violate(Violation::NullAllocation {
                    operation: "malloc",
                    size,
                });

                continue;
            };

            block.write_pattern(seed);

            let new_size = size.saturating_mul(2).min(config.max_size.0).max(size);

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

            live.push_back((block, seed, size));

            if live.len() > LIVE_BLOCKS
                && let Some((block, seed, len)) = live.pop_front()
            {
                release_checked(block, seed, len, run);
            }
        }
    }

    while let Some((block, seed, len)) = live.pop_front() {
        release_checked(block, seed, len, run);
    }
}

/// Verifies the pattern of a block written `len` bytes deep, then frees it.
fn release_checked(block: Block, seed: u8, len: usize, run: &mut ProbeRun) {
    if let Some(offset) = block.pattern_mismatch(seed, len) {
        run.violate(Violation::ContentLost {
            operation: "realloc",
            old_size: len,
            new_size: block.len(),
            offset,
        });
    }

    drop(block);
    run.ops(1);
}
