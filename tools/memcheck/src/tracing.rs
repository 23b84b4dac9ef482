use atsrt_errors::{MapDiagnostic, Result};
use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;

/// Environment variable holding the filter directives for the tracer.
pub(crate) const LOG_ENV: &str = "ATSRT_MEMCHECK_LOG";

#[derive(ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tracer {
    #[default]
    Console,
    Json,
}

pub(crate) fn register_global_tracer(kind: Tracer) -> Result<()> {
    match kind {
        Tracer::Console => register_console_tracer(),
        Tracer::Json => register_json_tracer(),
    }
}

/// Builds the filter from `ATSRT_MEMCHECK_LOG`, falling back to `info` when
/// the variable is unset. A variable which is set but malformed is an error.
fn filter_layer() -> Result<EnvFilter> {
    match std::env::var(LOG_ENV) {
        Ok(directives) => filter_from(Some(&directives)),
        Err(std::env::VarError::NotPresent) => filter_from(None),
        Err(err) => Err(err).map_cause(format!("could not read `{LOG_ENV}`")),
    }
}

fn filter_from(directives: Option<&str>) -> Result<EnvFilter> {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .parse(directives.unwrap_or("info"))
        .map_cause(format!("invalid filter directives in `{LOG_ENV}`"))
}

fn register_console_tracer() -> Result<()> {
    let format = tracing_subscriber::fmt::format()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_span_events(FmtSpan::CLOSE);

    let tracer = tracing_subscriber::registry().with(filter_layer()?).with(fmt_layer);

    tracing::subscriber::set_global_default(tracer).map_cause("could not register console tracer")
}

fn register_json_tracer() -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_thread_ids(true);

    let tracer = tracing_subscriber::registry().with(filter_layer()?).with(fmt_layer);

    tracing::subscriber::set_global_default(tracer).map_cause("could not register json tracer")
}
