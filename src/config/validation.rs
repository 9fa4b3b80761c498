//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//! - Resolve temporality overrides so unknown kinds fail before startup
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{ServiceConfig, SinkKind};
use crate::telemetry::temporality::TemporalitySelector;

/// One semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every section and collect all problems found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(addr) = &config.listener.bind_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "listener.bind_address",
                format!("'{}' is not a socket address", addr),
            ));
        }
    }

    if config.service.name.trim().is_empty() {
        errors.push(ValidationError::new("service.name", "must not be empty"));
    }
    if config.service.request_timeout_secs == 0 {
        errors.push(ValidationError::new("service.request_timeout_secs", "must be > 0"));
    }

    let telemetry = &config.telemetry;
    if telemetry.sink == SinkKind::Otlp {
        match Url::parse(&telemetry.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::new(
                "telemetry.endpoint",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                "telemetry.endpoint",
                format!("'{}' is not a URL: {}", telemetry.endpoint, e),
            )),
        }
    }
    if telemetry.export_interval_ms == 0 {
        errors.push(ValidationError::new("telemetry.export_interval_ms", "must be > 0"));
    }
    if telemetry.export_timeout_ms == 0 {
        errors.push(ValidationError::new("telemetry.export_timeout_ms", "must be > 0"));
    }
    if telemetry.batch_size == 0 {
        errors.push(ValidationError::new("telemetry.batch_size", "must be > 0"));
    }
    if telemetry.queue_capacity < telemetry.batch_size {
        errors.push(ValidationError::new(
            "telemetry.queue_capacity",
            "must be at least telemetry.batch_size",
        ));
    }
    if let Err(e) = TemporalitySelector::from_config(telemetry.temporality, &telemetry.temporality_overrides)
        .and_then(|selector| selector.exporter_temporality())
    {
        errors.push(ValidationError::new("telemetry.temporality_overrides", e.to_string()));
    }

    if tracing_subscriber::EnvFilter::try_new(&config.logging.level).is_err() {
        errors.push(ValidationError::new(
            "logging.level",
            format!("'{}' is not a valid filter directive", config.logging.level),
        ));
    }

    if config.prometheus.enabled && config.prometheus.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "prometheus.address",
            format!("'{}' is not a socket address", config.prometheus.address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
