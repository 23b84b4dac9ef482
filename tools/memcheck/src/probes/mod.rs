//! Runtime checks of the allocation contract exported by `atsrt_memalloc`.
//!
//! Each [`Probe`] exercises one property through the exported
//! `atsruntime_*_undef` functions and records every breach it observes as a
//! [`Violation`], instead of stopping at the first one.

mod alloc;
pub(crate) mod block;
mod concurrent;
mod realloc;
mod zeroed;


use std::fmt::Display;

use atsrt_errors::Error;
use clap::ValueEnum;

use crate::config::MemcheckConfig;
use crate::error;

/// A single check of one allocation contract property.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    /// Allocating then freeing a block never crashes.
    AllocFree,

    /// Zeroed allocations only contain zero bytes.
    ZeroedAlloc,

    /// Zeroed allocations with an overflowing size are rejected.
    ZeroedOverflow,

    /// Reallocation keeps the common prefix of the old and new block.
    ReallocPreserves,

    /// Reallocating a null pointer allocates a new block.
    ReallocFromNull,

    /// Failed reallocation leaves the original block intact.
    ReallocFailure,

    /// Freeing a null pointer does nothing.
    FreeNull,

    /// Allocation from several threads at once never corrupts blocks.
    Concurrent,
}

impl Probe {
    /// Every probe, in the order [`run_all`] executes them.
    pub const ALL: [Probe; 8] = [
        Probe::FreeNull,
        Probe::AllocFree,
        Probe::ZeroedAlloc,
        Probe::ZeroedOverflow,
        Probe::ReallocPreserves,
        Probe::ReallocFromNull,
        Probe::ReallocFailure,
        Probe::Concurrent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Probe::AllocFree => "alloc-free",
            Probe::ZeroedAlloc => "zeroed-alloc",
            Probe::ZeroedOverflow => "zeroed-overflow",
            Probe::ReallocPreserves => "realloc-preserves",
            Probe::ReallocFromNull => "realloc-from-null",
            Probe::ReallocFailure => "realloc-failure",
            Probe::FreeNull => "free-null",
            Probe::Concurrent => "concurrent",
        }
    }
}

impl Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single breach of the allocation contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A request within the configured limits returned null.
    NullAllocation { operation: &'static str, size: usize },

    /// A zeroed block contained a non-zero byte.
    NotZeroed { count: usize, elem_size: usize, offset: usize },

    /// A zeroed allocation with an overflowing size returned a block.
    OverflowAccepted { count: usize, elem_size: usize },

    /// Content which should have been preserved was changed.
    ContentLost {
        operation: &'static str,
        old_size: usize,
        new_size: usize,
        offset: usize,
    },

    /// A request no allocator can satisfy returned a block.
    UnsatisfiableAccepted { operation: &'static str, size: usize },

    /// A worker of the concurrent probe panicked.
    WorkerPanicked { worker: usize },
}

impl Violation {
    /// Converts the violation into a diagnostic, attributed to the given
    /// probe.
    pub fn into_diagnostic(self, probe: Probe) -> Error {
        let probe = probe.to_string();

        match self {
            Violation::NullAllocation { operation, size } => error::NullAllocation {
                probe,
                operation: operation.to_string(),
                size,
            }
            .into(),
            Violation::NotZeroed {
                count,
                elem_size,
                offset,
            } => error::NotZeroed {
                probe,
                count,
                elem_size,
                offset,
            }
            .into(),
            Violation::OverflowAccepted { count, elem_size } => error::OverflowAccepted {
                probe,
                count,
                elem_size,
            }
            .into(),
            Violation::ContentLost {
                operation,
                old_size,
                new_size,
                offset,
            } => error::ContentLost {
                probe,
                operation: operation.to_string(),
                old_size,
                new_size,
                offset,
            }
            .into(),
            Violation::UnsatisfiableAccepted { operation, size } => error::UnsatisfiableAccepted {
                probe,
                operation: operation.to_string(),
                size,
            }
            .into(),
            Violation::WorkerPanicked { worker } => error::WorkerPanicked { probe, worker }.into(),
        }
    }
}

/// Outcome of running a single [`Probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub probe: Probe,

    /// Amount of calls made to the exported allocation functions.
    pub operations: usize,

    pub violations: Vec<Violation>,
}

impl ProbeReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Accumulates the calls and violations of a probe while it runs.
#[derive(Debug, Default)]
pub(crate) struct ProbeRun {
    operations: usize,
    violations: Vec<Violation>,
}

impl ProbeRun {
    /// Records `count` calls to the exported allocation functions.
    pub(crate) fn ops(&mut self, count: usize) {
        self.operations += count;
    }

    pub(crate) fn violate(&mut self, violation: Violation) {
        tracing::debug!(?violation, "contract violated");

        self.violations.push(violation);
    }

    pub(crate) fn merge(&mut self, other: ProbeRun) {
        self.operations += other.operations;
        self.violations.extend(other.violations);
    }
}

/// Runs a single probe against the exported allocation functions.
pub fn run_probe(probe: Probe, config: &MemcheckConfig) -> ProbeReport {
    let span = tracing::info_span!("probe", name = probe.name());
    let _enter = span.enter();

    let mut run = ProbeRun::default();

    match probe {
        Probe::AllocFree => alloc::alloc_free(config, &mut run),
        Probe::FreeNull => alloc::free_null(config, &mut run),
        Probe::ZeroedAlloc => zeroed::zeroed_alloc(config, &mut run),
        Probe::ZeroedOverflow => zeroed::zeroed_overflow(config, &mut run),
        Probe::ReallocPreserves => realloc::realloc_preserves(config, &mut run),
        Probe::ReallocFromNull => realloc::realloc_from_null(config, &mut run),
        Probe::ReallocFailure => realloc::realloc_failure(config, &mut run),
        Probe::Concurrent => concurrent::concurrent(config, &mut run),
    }

    tracing::info!(
        operations = run.operations,
        violations = run.violations.len(),
        "probe finished"
    );

    ProbeReport {
        probe,
        operations: run.operations,
        violations: run.violations,
    }
}

/// Runs every probe in [`Probe::ALL`], in order.
pub fn run_all(config: &MemcheckConfig) -> Vec<ProbeReport> {
    Probe::ALL.iter().map(|probe| run_probe(*probe, config)).collect()
}
