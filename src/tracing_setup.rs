use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize tracing with custom configuration
pub fn init_tracing_with_config(level: &str, json_format: bool, include_spans: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?;

    // Worker threads are named after their work queue
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let installed = if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(include_spans)
                    .with_span_list(include_spans),
            )
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
    };
    installed.wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(
        level,
        json = json_format,
        spans = include_spans,
        "Ward logging initialized"
    );
    Ok(())
}

/// Initialize tracing from the `[logging]` section of the configuration
pub fn init_from_config(logging: &LoggingConfig) -> Result<()> {
    init_tracing_with_config(&logging.level, logging.json, logging.spans)
}

/// Span covering one change to a work queue executor
pub fn work_queue_span(id: u64, name: &str) -> tracing::Span {
    tracing::info_span!("work_queue", queue.id = id, queue.name = name)
}

/// Span covering one failover routing call. `server` and `attempts` are
/// recorded as attempts are made.
pub fn failover_span(strategy: &str) -> tracing::Span {
    tracing::info_span!(
        "failover",
        strategy = strategy,
        server = tracing::field::Empty,
        attempts = tracing::field::Empty,
    )
}
