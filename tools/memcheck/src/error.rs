use atsrt_errors::Diagnostic;

#[derive(Diagnostic, Debug)]
#[diagnostic(
    message = "{probe}: {operation} returned null for a request of {size} bytes",
    code = "MEM0001",
    help = "the request is within `max_size`, so the host allocator should have satisfied it"
)]
pub struct NullAllocation {
    pub probe: String,
    pub operation: String,
    pub size: usize,
}

#[derive(Diagnostic, Debug)]
#[diagnostic(
    message = "{probe}: zeroed block of {count} x {elem_size} bytes has a non-zero byte at offset {offset}",
    code = "MEM0002",
    help = "every byte returned by `atsruntime_calloc_undef` must be zero"
)]
pub struct NotZeroed {
    pub probe: String,
    pub count: usize,
    pub elem_size: usize,
    pub offset: usize,
}

#[derive(Diagnostic, Debug)]
#[diagnostic(
    message = "{probe}: zeroed allocation of {count} x {elem_size} bytes succeeded, even though the size overflows",
    code = "MEM0003",
    help = "an overflowing `count * elem_size` must be rejected with a null pointer"
)]
pub struct OverflowAccepted {
    pub probe: String,
    pub count: usize,
    pub elem_size: usize,
}

#[derive(Diagnostic, Debug)]
#[diagnostic(
    message = "{probe}: {operation} from {old_size} to {new_size} bytes changed the byte at offset {offset}",
    code = "MEM0004",
    help = "content must be preserved up to the smaller of the old and new sizes"
)]
pub struct ContentLost {
    pub probe: String,
    pub operation: String,
    pub old_size: usize,
    pub new_size: usize,
    pub offset: usize,
}

#[derive(Diagnostic, Debug)]
#[diagnostic(
    message = "{probe}: {operation} of {size} bytes succeeded, even though no allocator can satisfy it",
    code = "MEM0005",
    help = "requests larger than the address space must fail with a null pointer"
)]
pub struct UnsatisfiableAccepted {
    pub probe: String,
    pub operation: String,
    pub size: usize,
}

#[derive(Diagnostic, Debug)]
#[diagnostic(
    message = "{probe}: worker thread {worker} panicked",
    code = "MEM0006",
    help = "run again with `--trace` to see the last request the worker sent"
)]
pub struct WorkerPanicked {
    pub probe: String,
    pub worker: usize,
}

#[derive(Diagnostic, Debug)]
#[diagnostic(
    message = "unknown probe {name:?}",
    code = "MEM0007",
    help = "run with `--list` to see the available probes"
)]
pub struct UnknownProbe {
    pub name: String,
}
