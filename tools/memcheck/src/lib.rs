//! Contract checker for the ATS runtime allocation shim.
//!
//! Links `atsrt_memalloc` and runs a set of [`Probe`]s against the exported
//! `atsruntime_*_undef` functions, reporting every breach of the allocation
//! contract as a diagnostic.

pub mod config;
pub(crate) mod error;
pub mod probes;
mod tracing;

use std::path::PathBuf;

use atsrt_errors::{DiagCtx, DiagCtxHandle, GraphicalRenderer};
use clap::{Parser, ValueEnum, ValueHint};
use owo_colors::OwoColorize;

pub use config::{ByteSize, MemcheckConfig};
pub use probes::{Probe, ProbeReport, Violation, run_all, run_probe};

#[derive(Debug, Parser)]
#[clap(
    name = "atsrt-memcheck",
    version = env!("CARGO_PKG_VERSION"),
    about = "Verifies the ATS runtime allocation shim against the host allocator",
    long_about = None
)]
pub(crate) struct MemcheckCli {
    #[arg(long, help = "Path to the config file", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[arg(long = "probe", value_name = "PROBE", help = "Only run the given probe (can be repeated)")]
    pub probes: Vec<String>,

    #[arg(long, help = "Print the exported symbols and available probes, then exit")]
    pub list: bool,

    #[arg(long = "trace", help = "Enables tracing of the probes")]
    pub trace: bool,

    #[arg(value_enum, long = "tracer", help = "Defines which tracer to use")]
    pub tracer: Option<tracing::Tracer>,
}

pub fn memcheck_entry() {
    let opts = MemcheckCli::parse();
    let dcx = DiagCtx::new();

    dcx.with_none(|handle| {
        memcheck(&opts, handle);
    });

    ::tracing::debug!(diagnostics = dcx.count(), "memcheck finished");

    let mut renderer = GraphicalRenderer::new();
    dcx.render_stderr(&mut renderer);

    std::process::exit(exit_code(&dcx));
}

/// Exit status of a run: `1` if any error was reported, `0` otherwise.
fn exit_code(dcx: &DiagCtx) -> i32 {
    i32::from(dcx.is_tainted())
}

/// Runs the probes selected by `opts`, emitting every failure onto `dcx`.
/// Returns the reports of the probes which ran.
fn memcheck(opts: &MemcheckCli, dcx: DiagCtxHandle) -> Vec<ProbeReport> {
    let tracer = if opts.trace {
        Some(tracing::Tracer::default())
    } else {
        opts.tracer
    };

    if let Some(tracer) = tracer
        && let Err(err) = tracing::register_global_tracer(tracer)
    {
        dcx.emit(err);
    }

    if opts.list {
        print_listing();
        return Vec::new();
    }

    let Some(probes) = select_probes(&opts.probes, &dcx) else {
        return Vec::new();
    };

    let config = match config::read_config_file(opts.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            dcx.emit(err);
            return Vec::new();
        }
    };

    let mut reports = Vec::with_capacity(probes.len());

    for probe in probes {
        let report = run_probe(probe, &config);
        print_report(&report);

        for violation in report.violations.iter().cloned() {
            dcx.emit(violation.into_diagnostic(probe));
        }

        reports.push(report);
    }

    reports
}

/// Resolves the probe names given on the command line. With no names, every
/// probe is selected. Returns [`None`] if any name is unknown, after emitting
/// a diagnostic for each of them.
fn select_probes(names: &[String], dcx: &DiagCtxHandle) -> Option<Vec<Probe>> {
    if names.is_empty() {
        return Some(Probe::ALL.to_vec());
    }

    let mut probes = Vec::with_capacity(names.len());
    let mut unknown = false;

    for name in names {
        match Probe::from_str(name, true) {
            Ok(probe) => probes.push(probe),
            Err(_) => {
                dcx.emit(error::UnknownProbe { name: name.clone() }.into());
                unknown = true;
            }
        }
    }

    (!unknown).then_some(probes)
}

fn print_report(report: &ProbeReport) {
    if report.is_ok() {
        println!(
            "{:>8} {} ({} operations)",
            "ok".green().bold(),
            report.probe,
            report.operations
        );
    } else {
        println!(
            "{:>8} {} ({} operations, {} violations)",
            "FAILED".red().bold(),
            report.probe,
            report.operations,
            report.violations.len()
        );
    }
}

fn print_listing() {
    println!("{}", "symbols:".bold());
    for &(name, addr) in atsrt_memalloc::MEMALLOC_FUNCTIONS {
        println!("  {name} @ {addr:p}");
    }

    println!("{}", "probes:".bold());
    for probe in Probe::ALL {
        println!("  {probe}");
    }
}
