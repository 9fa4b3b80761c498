//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     TelemetryPipeline → logging.rs (console subscriber + log bridge)
//!     TelemetryPipeline → TelemetryContext (tracer + invocation metrics)
//!
//! Per request:
//!     instrumentation middleware → TelemetryContext → spans, metrics
//!     tracing events → log bridge → SdkLoggerProvider
//! ```
//!
//! # Design Decisions
//! - One `TelemetryContext`, built before the listener binds, shared via axum state
//! - Recording goes through `InvocationRecorder` so tests can swap the instruments

pub mod logging;
pub mod metrics;

use std::sync::Arc;

use axum::http::HeaderMap;
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;

use crate::config::Variant;
use crate::observability::metrics::{InvocationDimension, InvocationMetrics, InvocationRecorder};
use crate::telemetry::{propagation, ServiceTracer, TelemetryPipeline};

/// Everything the request instrumentation needs, bundled once at startup.
#[derive(Clone)]
pub struct TelemetryContext {
    tracer: ServiceTracer,
    propagator: TraceContextPropagator,
    recorder: Arc<dyn InvocationRecorder>,
    dimension: InvocationDimension,
}

impl TelemetryContext {
    pub fn new(tracer: ServiceTracer, recorder: Arc<dyn InvocationRecorder>, dimension: InvocationDimension) -> Self {
        Self {
            tracer,
            propagator: TraceContextPropagator::new(),
            recorder,
            dimension,
        }
    }

    /// Register the request instruments on the pipeline's meter.
    pub fn from_pipeline(pipeline: &TelemetryPipeline, variant: Variant) -> Self {
        let metrics = InvocationMetrics::register(&pipeline.meter());
        Self::new(
            pipeline.tracer(),
            Arc::new(metrics),
            InvocationDimension::for_variant(variant),
        )
    }

    pub fn tracer(&self) -> &ServiceTracer {
        &self.tracer
    }

    /// Remote parent carried by `traceparent`, or an empty context.
    pub fn extract_parent(&self, headers: &HeaderMap) -> Context {
        propagation::extract_parent(&self.propagator, headers)
    }

    pub fn recorder(&self) -> &dyn InvocationRecorder {
        self.recorder.as_ref()
    }

    pub fn dimension(&self) -> InvocationDimension {
        self.dimension
    }
}

impl std::fmt::Debug for TelemetryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryContext")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}
