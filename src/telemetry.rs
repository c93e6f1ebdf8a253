use std::io::{self, IsTerminal};
use std::sync::OnceLock;
use std::time::Duration;

use indicatif::ProgressStyle;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::level_filters::LevelFilter;
use tracing::{Level, Metadata};
use tracing_indicatif::{IndicatifLayer, TickSettings};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

use crate::error::TelemetryError;

/// Spans under this target prefix get a progress line on interactive terminals.
const PROGRESS_TARGET_PREFIX: &str = "tesmart::";
const DEFAULT_FILTER: &str = "warn";
const PROGRESS_TICK: Duration = Duration::from_millis(90);

static TRACING: OnceLock<Result<(), TelemetryError>> = OnceLock::new();

/// Installs the global tracing subscriber.
///
/// Only the first call installs anything; later calls return its result, so
/// every CLI entry point can call this unconditionally.
pub(crate) fn initialise_tracing(
    service_name: &str,
    interactive_terminal: bool,
    level_override: Option<LevelFilter>,
) -> Result<(), &'static TelemetryError> {
    TRACING
        .get_or_init(|| install(service_name, interactive_terminal, level_override))
        .as_ref()
        .copied()
}

fn install(
    service_name: &str,
    interactive_terminal: bool,
    level_override: Option<LevelFilter>,
) -> Result<(), TelemetryError> {
    let provider = SdkTracerProvider::builder().build();
    let tracer = provider.tracer(service_name.to_owned());
    global::set_tracer_provider(provider);
    let log_filter = log_filter(level_override);

    if interactive_terminal && io::stderr().is_terminal() {
        // Log lines go through indicatif so they don't tear the spinners.
        let indicatif_layer = IndicatifLayer::new()
            .with_progress_style(progress_style())
            .with_tick_settings(TickSettings {
                default_tick_interval: Some(PROGRESS_TICK),
                ..TickSettings::default()
            });
        let log_layer = fmt::layer()
            .pretty()
            .with_target(false)
            .with_writer(indicatif_layer.get_stderr_writer())
            .with_filter(log_filter);

        tracing_subscriber::registry()
            .with(log_layer)
            .with(indicatif_layer.with_filter(filter::filter_fn(is_progress_span)))
            .with(OpenTelemetryLayer::new(tracer))
            .try_init()?;
    } else {
        let log_layer = fmt::layer()
            .json()
            .with_target(false)
            .with_writer(io::stderr)
            .with_filter(log_filter);

        tracing_subscriber::registry()
            .with(log_layer)
            .with(OpenTelemetryLayer::new(tracer))
            .try_init()?;
    }

    Ok(())
}

/// `--log-level` wins over `RUST_LOG`; without either only warnings are shown.
fn log_filter(level_override: Option<LevelFilter>) -> EnvFilter {
    match level_override {
        Some(level) => EnvFilter::default().add_directive(level.into()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} {span_name} {msg}")
        .unwrap_or_else(|_error| ProgressStyle::default_spinner())
}

/// Command-level spans only.
fn is_progress_span(metadata: &Metadata<'_>) -> bool {
    metadata.is_span()
        && metadata.target().starts_with(PROGRESS_TARGET_PREFIX)
        && *metadata.level() <= Level::INFO
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::debug(LevelFilter::DEBUG)]
    #[case::trace(LevelFilter::TRACE)]
    #[case::off(LevelFilter::OFF)]
    fn explicit_level_becomes_the_filter(#[case] level: LevelFilter) {
        assert_eq!(Some(level), log_filter(Some(level)).max_level_hint());
    }
}
