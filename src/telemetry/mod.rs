//! Telemetry pipeline on the OpenTelemetry SDK.
//!
//! # Data Flow
//! ```text
//! Request path:
//!     ServiceTracer → server span, child spans → BatchSpanProcessor
//!     Meter instruments → SDK aggregation (temporality from TemporalitySelector)
//!     tracing events → OpenTelemetryTracingBridge → BatchLogProcessor
//!
//! Background:
//!     batch processors and PeriodicReader → OTLP/HTTP JSON | stdout
//! ```
//!
//! # Design Decisions
//! - No global provider; the pipeline hands out its tracer and meter explicitly
//! - The exporter temporality is derived from the per-kind table and rejected
//!   at startup when no exporter preference reproduces it
//! - Recording never blocks on export

pub mod error;
pub mod pipeline;
pub mod propagation;
pub mod temporality;

use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

/// Instrumentation scope reported on every span and instrument.
pub const INSTRUMENTATION_SCOPE: &str = env!("CARGO_PKG_NAME");

/// Tracer handed to the middleware and handlers.
pub type ServiceTracer = <SdkTracerProvider as TracerProvider>::Tracer;

pub use error::TelemetryError;
pub use pipeline::TelemetryPipeline;
pub use temporality::{temporality_for, InstrumentKind, Temporality, TemporalityPolicy, TemporalitySelector};
