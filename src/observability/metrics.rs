//! Request metrics.
//!
//! # Responsibilities
//! - Create the request-duration histogram and invocation counter once
//! - Track in-flight requests and process uptime
//! - Mirror every measurement into the `metrics` facade for Prometheus scrapes
//!
//! # Metrics
//! - `http.server.duration` (histogram, ms): request latency by method, route, host, status
//! - `fibonacci.invocations` (counter): invocations by validity or status code
//! - `http.server.active_requests` (up-down counter): requests currently in flight
//! - `process.uptime` (observable gauge, s): time since the instruments were registered
//!
//! # Design Decisions
//! - Instruments are registered on the pipeline meter before the listener binds
//! - Recording never waits on export

use axum::http::StatusCode;
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::metrics::{Counter, Histogram, Meter, ObservableGauge, UpDownCounter};
use opentelemetry::KeyValue;
use std::net::SocketAddr;
use std::time::Instant;

use crate::config::Variant;
use crate::telemetry::TelemetryError;

pub const DURATION_METRIC: &str = "http.server.duration";
pub const INVOCATIONS_METRIC: &str = "fibonacci.invocations";
pub const ACTIVE_REQUESTS_METRIC: &str = "http.server.active_requests";
pub const UPTIME_METRIC: &str = "process.uptime";

/// Bucket boundaries (ms) for sub-second request latencies.
pub const DURATION_BOUNDS_MS: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0, 10000.0,
];

/// Label that splits the invocation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationDimension {
    /// `fibonacci.valid.n`: whether the input was accepted.
    ValidN,
    /// `http.status_code`: the response status.
    StatusCode,
}

impl InvocationDimension {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Classic => InvocationDimension::StatusCode,
            Variant::Guided => InvocationDimension::ValidN,
        }
    }

    /// Invocation label for a request that completed with `status`.
    pub fn label(self, status: StatusCode) -> KeyValue {
        match self {
            InvocationDimension::ValidN => KeyValue::new("fibonacci.valid.n", status.is_success()),
            InvocationDimension::StatusCode => {
                KeyValue::new("http.status_code", i64::from(status.as_u16()))
            }
        }
    }
}

/// Destination of the per-request measurements.
pub trait InvocationRecorder: Send + Sync {
    fn record_duration(&self, ms: f64, labels: &[KeyValue]);

    fn record_invocation(&self, labels: &[KeyValue]);

    fn request_started(&self, _labels: &[KeyValue]) {}

    fn request_finished(&self, _labels: &[KeyValue]) {}
}

/// Process-wide request instruments.
pub struct InvocationMetrics {
    duration: Histogram<f64>,
    invocations: Counter<u64>,
    active: UpDownCounter<i64>,
    _uptime: ObservableGauge<f64>,
}

impl InvocationMetrics {
    /// Register every request instrument on `meter`.
    pub fn register(meter: &Meter) -> Self {
        let duration = meter
            .f64_histogram(DURATION_METRIC)
            .with_unit("ms")
            .with_description("Duration of inbound HTTP requests")
            .with_boundaries(DURATION_BOUNDS_MS.to_vec())
            .build();
        let invocations = meter
            .u64_counter(INVOCATIONS_METRIC)
            .with_description("Fibonacci invocations")
            .build();
        let active = meter
            .i64_up_down_counter(ACTIVE_REQUESTS_METRIC)
            .with_unit("{request}")
            .with_description("Requests currently being served")
            .build();

        let started = Instant::now();
        let uptime = meter
            .f64_observable_gauge(UPTIME_METRIC)
            .with_unit("s")
            .with_callback(move |observer| observer.observe(started.elapsed().as_secs_f64(), &[]))
            .build();

        describe_facade();

        Self {
            duration,
            invocations,
            active,
            _uptime: uptime,
        }
    }
}

impl InvocationRecorder for InvocationMetrics {
    fn record_duration(&self, ms: f64, labels: &[KeyValue]) {
        metrics::histogram!(prometheus_name(DURATION_METRIC), &facade_labels(labels)).record(ms);
        self.duration.record(ms, labels);
    }

    fn record_invocation(&self, labels: &[KeyValue]) {
        metrics::counter!(prometheus_name(INVOCATIONS_METRIC), &facade_labels(labels)).increment(1);
        self.invocations.add(1, labels);
    }

    fn request_started(&self, labels: &[KeyValue]) {
        metrics::gauge!(prometheus_name(ACTIVE_REQUESTS_METRIC), &facade_labels(labels)).increment(1.0);
        self.active.add(1, labels);
    }

    fn request_finished(&self, labels: &[KeyValue]) {
        metrics::gauge!(prometheus_name(ACTIVE_REQUESTS_METRIC), &facade_labels(labels)).decrement(1.0);
        self.active.add(-1, labels);
    }
}

/// Dotted instrument names become underscore-separated Prometheus names.
fn prometheus_name(name: &str) -> String {
    name.replace('.', "_")
}

fn facade_labels(labels: &[KeyValue]) -> Vec<(String, String)> {
    labels
        .iter()
        .map(|kv| (prometheus_name(kv.key.as_str()), kv.value.to_string()))
        .collect()
}

fn describe_facade() {
    metrics::describe_histogram!(
        prometheus_name(DURATION_METRIC),
        metrics::Unit::Milliseconds,
        "Duration of inbound HTTP requests"
    );
    metrics::describe_counter!(prometheus_name(INVOCATIONS_METRIC), "Fibonacci invocations");
    metrics::describe_gauge!(prometheus_name(ACTIVE_REQUESTS_METRIC), "Requests currently being served");
}

/// Install the Prometheus recorder and its scrape listener.
pub fn init_prometheus(addr: SocketAddr) -> Result<(), TelemetryError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(&DURATION_BOUNDS_MS)
        .map_err(|e| TelemetryError::Prometheus(e.to_string()))?
        .install()
        .map_err(|e| TelemetryError::Prometheus(e.to_string()))?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}
