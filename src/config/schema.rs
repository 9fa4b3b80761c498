//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::telemetry::temporality::TemporalityPolicy;

/// Root configuration for the Fibonacci service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// HTTP surface and request handling.
    pub service: ServiceSettings,

    /// Telemetry export settings.
    pub telemetry: TelemetryConfig,

    /// Console log output.
    pub logging: LoggingConfig,

    /// Local Prometheus scrape endpoint.
    pub prometheus: PrometheusConfig,
}

impl ServiceConfig {
    /// Address to bind: the configured one, or the variant's default port.
    pub fn bind_address(&self) -> String {
        match &self.listener.bind_address {
            Some(addr) => addr.clone(),
            None => format!("0.0.0.0:{}", self.service.variant.default_port()),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080"). Unset means the variant default.
    pub bind_address: Option<String>,
}

/// Which HTTP surface to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// `GET /fibonacci?n=` and `GET /fib?n=`, counted by status code.
    #[default]
    Classic,
    /// `GET /?num=`, counted by input validity.
    Guided,
}

impl Variant {
    pub fn default_port(self) -> u16 {
        match self {
            Variant::Classic => 8080,
            Variant::Guided => 5000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Classic => "classic",
            Variant::Guided => "guided",
        }
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(Variant::Classic),
            "guided" => Ok(Variant::Guided),
            other => Err(format!("unknown variant '{}', expected 'classic' or 'guided'", other)),
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub variant: Variant,

    /// Service name reported in telemetry resource attributes.
    pub name: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            variant: Variant::Classic,
            name: "fibonacci-service".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Where exported telemetry goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// OTLP/HTTP with JSON bodies to the collector endpoint.
    #[default]
    #[serde(alias = "http")]
    Otlp,
    /// Pretty-printed on stdout.
    #[serde(alias = "log")]
    Console,
    /// Discard everything.
    None,
}

/// Telemetry export settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Collector base URL; `/v1/traces`, `/v1/metrics` and `/v1/logs` are appended.
    pub endpoint: String,

    pub sink: SinkKind,

    /// Metric collection interval and batch flush delay.
    pub export_interval_ms: u64,

    /// Timeout for one export request to the collector.
    pub export_timeout_ms: u64,

    /// Maximum spans (or log records) per export batch.
    pub batch_size: usize,

    /// Bounded queue in front of each batch processor; overflow is dropped.
    pub queue_capacity: usize,

    /// Temporality applied to instrument kinds without an override.
    pub temporality: TemporalityPolicy,

    /// Per instrument kind override, e.g. `histogram = "cumulative"`.
    pub temporality_overrides: HashMap<String, String>,

    /// Bridge `tracing` events to the sink as log records.
    pub export_logs: bool,

    /// Fixed `service.instance.id`; a random UUID when unset.
    pub instance_id: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4318".to_string(),
            sink: SinkKind::Otlp,
            export_interval_ms: 2000,
            export_timeout_ms: 5000,
            batch_size: 512,
            queue_capacity: 2048,
            temporality: TemporalityPolicy::Delta,
            temporality_overrides: HashMap::new(),
            export_logs: true,
            instance_id: None,
        }
    }
}

/// Console logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "fibonacci_telemetry=info,tower_http=info,opentelemetry=warn".to_string(),
            json: false,
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub enabled: bool,

    /// Scrape endpoint bind address.
    pub address: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9464".to_string(),
        }
    }
}
