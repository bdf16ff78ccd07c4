use crate::{
    config::LoggingConfig,
    error::{AppError, Result},
};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Initialize structured logging for the server.
///
/// `RUST_LOG` drives the filter (default `info`); `LOG_FORMAT` picks between
/// `compact`, `pretty` and `json` output.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    init_with_default(config, "info,sqlx=warn")
}

/// CLI variant: progress goes through the console printer, so only warnings
/// and errors are logged unless `RUST_LOG` says otherwise.
pub fn init_cli_logging(config: &LoggingConfig) -> Result<()> {
    init_with_default(config, "warn")
}

fn init_with_default(config: &LoggingConfig, default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = match config.format.as_str() {
        "json" => fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .json()
            .boxed(),
        "pretty" => fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::NONE)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .pretty()
            .boxed(),
        _ => fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_span_events(FmtSpan::NONE)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .compact()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::ConfigurationError(format!("Failed to initialize logging: {}", e)))
}
