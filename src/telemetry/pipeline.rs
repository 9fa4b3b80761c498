//! Telemetry pipeline construction.
//!
//! Builds the SDK tracer, meter and logger providers against the exporters
//! selected by configuration. Every construction error is returned before a
//! provider is started.

use std::time::Duration;

use opentelemetry::metrics::{Meter, MeterProvider};
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{self as sdk_logs, BatchLogProcessor, LogExporter, SdkLoggerProvider};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, SdkTracerProvider, SpanExporter};
use opentelemetry_sdk::Resource;

use crate::config::schema::{SinkKind, TelemetryConfig};
use crate::telemetry::error::TelemetryError;
use crate::telemetry::temporality::TemporalitySelector;
use crate::telemetry::{ServiceTracer, INSTRUMENTATION_SCOPE};

pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";

/// Running tracer, meter and logger providers.
pub struct TelemetryPipeline {
    resource: Resource,
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: Option<SdkLoggerProvider>,
}

impl TelemetryPipeline {
    /// Build the configured exporters and start the providers.
    pub fn start(config: &TelemetryConfig, service_name: &str) -> Result<Self, TelemetryError> {
        let selector = TemporalitySelector::from_config(config.temporality, &config.temporality_overrides)?;
        let temporality = selector.exporter_temporality()?;
        let resource = service_resource(service_name, config.instance_id.clone());

        match config.sink {
            SinkKind::Otlp => {
                let timeout = Duration::from_millis(config.export_timeout_ms);
                let spans = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .with_protocol(Protocol::HttpJson)
                    .with_endpoint(signal_endpoint(&config.endpoint, "traces"))
                    .with_timeout(timeout)
                    .build()
                    .map_err(|source| TelemetryError::Exporter { signal: "traces", source })?;
                let metrics = opentelemetry_otlp::MetricExporter::builder()
                    .with_temporality(temporality)
                    .with_http()
                    .with_protocol(Protocol::HttpJson)
                    .with_endpoint(signal_endpoint(&config.endpoint, "metrics"))
                    .with_timeout(timeout)
                    .build()
                    .map_err(|source| TelemetryError::Exporter { signal: "metrics", source })?;
                let logs = opentelemetry_otlp::LogExporter::builder()
                    .with_http()
                    .with_protocol(Protocol::HttpJson)
                    .with_endpoint(signal_endpoint(&config.endpoint, "logs"))
                    .with_timeout(timeout)
                    .build()
                    .map_err(|source| TelemetryError::Exporter { signal: "logs", source })?;
                Ok(Self::from_exporters(resource, config, spans, metrics, logs))
            }
            SinkKind::Console => Ok(Self::from_exporters(
                resource,
                config,
                opentelemetry_stdout::SpanExporter::default(),
                opentelemetry_stdout::MetricExporter::builder()
                    .with_temporality(temporality)
                    .build(),
                opentelemetry_stdout::LogExporter::default(),
            )),
            SinkKind::None => Ok(Self {
                tracer_provider: SdkTracerProvider::builder().with_resource(resource.clone()).build(),
                meter_provider: SdkMeterProvider::builder().with_resource(resource.clone()).build(),
                logger_provider: None,
                resource,
            }),
        }
    }

    /// Wire already-built exporters into batch processors and a periodic reader.
    pub fn from_exporters<S, M, L>(
        resource: Resource,
        config: &TelemetryConfig,
        spans: S,
        metrics: M,
        logs: L,
    ) -> Self
    where
        S: SpanExporter + 'static,
        M: PushMetricExporter + 'static,
        L: LogExporter + 'static,
    {
        let interval = Duration::from_millis(config.export_interval_ms);

        let tracer_provider = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_span_processor(batch_span_processor(spans, config))
            .build();

        let reader = PeriodicReader::builder(metrics).with_interval(interval).build();
        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build();

        let logger_provider = config.export_logs.then(|| {
            let batch = sdk_logs::BatchConfigBuilder::default()
                .with_max_queue_size(config.queue_capacity)
                .with_max_export_batch_size(config.batch_size)
                .with_scheduled_delay(interval)
                .build();
            SdkLoggerProvider::builder()
                .with_resource(resource.clone())
                .with_log_processor(BatchLogProcessor::builder(logs).with_batch_config(batch).build())
                .build()
        });

        Self {
            resource,
            tracer_provider,
            meter_provider,
            logger_provider,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn instance_id(&self) -> Option<String> {
        self.resource
            .iter()
            .find(|(key, _)| key.as_str() == SERVICE_INSTANCE_ID)
            .map(|(_, value)| value.to_string())
    }

    pub fn tracer(&self) -> ServiceTracer {
        self.tracer_provider.tracer(INSTRUMENTATION_SCOPE)
    }

    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(INSTRUMENTATION_SCOPE)
    }

    /// Provider for the log bridge, when log export is enabled.
    pub fn logger_provider(&self) -> Option<&SdkLoggerProvider> {
        self.logger_provider.as_ref()
    }

    /// Flush and stop every provider.
    ///
    /// Queued spans go first, then the final metric collection, then logs, so
    /// records emitted while flushing the first two still get exported. Call
    /// only after the server has drained; anything recorded afterwards is lost.
    pub async fn shutdown(self) {
        let Self {
            tracer_provider,
            meter_provider,
            logger_provider,
            ..
        } = self;

        let flushed = tokio::task::spawn_blocking(move || {
            report("traces", tracer_provider.shutdown());
            report("metrics", meter_provider.shutdown());
            if let Some(logger_provider) = logger_provider {
                report("logs", logger_provider.shutdown());
            }
        })
        .await;

        if let Err(e) = flushed {
            tracing::warn!(error = %e, "Telemetry shutdown task ended abnormally");
        }
    }
}

fn report(signal: &'static str, result: OTelSdkResult) {
    match result {
        Ok(()) => tracing::debug!(signal, "Telemetry provider flushed"),
        Err(e) => tracing::warn!(signal, error = %e, "Telemetry provider shutdown failed"),
    }
}

/// Resource attributes attached to every exported batch.
pub fn service_resource(service_name: &str, instance_id: Option<String>) -> Resource {
    let instance_id = instance_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attribute(KeyValue::new(SERVICE_INSTANCE_ID, instance_id))
        .build()
}

/// Full per-signal URL under the collector base. The OTLP builders use a
/// programmatic endpoint verbatim.
fn signal_endpoint(base: &str, signal: &str) -> String {
    format!("{}/v1/{}", base.trim_end_matches('/'), signal)
}

/// Bounded span batching. Spans ended while the queue is full are dropped and
/// counted by the processor, which reports the count as an `opentelemetry_sdk`
/// warning.
pub fn batch_span_processor<S: SpanExporter + 'static>(
    exporter: S,
    config: &TelemetryConfig,
) -> BatchSpanProcessor {
    let batch = BatchConfigBuilder::default()
        .with_max_queue_size(config.queue_capacity)
        .with_max_export_batch_size(config.batch_size)
        .with_scheduled_delay(Duration::from_millis(config.export_interval_ms))
        .build();
    BatchSpanProcessor::builder(exporter).with_batch_config(batch).build()
}
