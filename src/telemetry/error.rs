//! Telemetry error types.

use thiserror::Error;

/// Raised while building the telemetry pipeline. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("unrecognized instrument kind '{0}'")]
    UnknownInstrumentKind(String),

    #[error("unrecognized temporality '{0}' (expected 'delta' or 'cumulative')")]
    UnknownTemporality(String),

    #[error("no exporter temporality produces {0}")]
    UnsupportedTemporality(String),

    #[error("failed to build {signal} exporter: {source}")]
    Exporter {
        signal: &'static str,
        #[source]
        source: opentelemetry_otlp::ExporterBuildError,
    },

    #[error("failed to start Prometheus exporter: {0}")]
    Prometheus(String),
}
