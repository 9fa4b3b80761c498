//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Bridge events to the OpenTelemetry logger provider when log export is on
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` beats the configured level
//! - Log records take their trace context from the OpenTelemetry context
//!   active when the event fires, which the request middleware attaches
//! - Events from the export path and the HTTP client stack are never
//!   bridged, so a failing collector cannot feed its own queue

use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter, Layer};

use crate::config::schema::LoggingConfig;

const SUPPRESSED_TARGETS: [&str; 4] = ["opentelemetry", "reqwest", "hyper", "h2"];

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Events the log bridge must not export.
pub fn is_export_internal(target: &str) -> bool {
    SUPPRESSED_TARGETS.iter().any(|t| target.starts_with(t))
}

/// Install the global subscriber, bridging to `logs` when given.
pub fn init(config: &LoggingConfig, logs: Option<&SdkLoggerProvider>) -> Result<(), LoggingError> {
    subscriber(config, logs)?.try_init()?;
    Ok(())
}

/// The subscriber `init` installs, for callers that scope it themselves.
pub fn subscriber(
    config: &LoggingConfig,
    logs: Option<&SdkLoggerProvider>,
) -> Result<impl Subscriber + Send + Sync + 'static, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| LoggingError::Filter {
            directive: config.level.clone(),
            reason: e.to_string(),
        })?,
    };

    let bridge = logs.map(|provider| {
        OpenTelemetryTracingBridge::new(provider)
            .with_filter(filter_fn(|metadata| !is_export_internal(metadata.target())))
    });

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(config.json.then(|| fmt_layer::layer().json()))
        .with((!config.json).then(fmt_layer::layer))
        .with(bridge))
}
