//! Shared utilities for integration tests.
#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use opentelemetry::trace::{SpanKind, TracerProvider};
use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

use fibonacci_telemetry::config::schema::{SinkKind, TelemetryConfig};
use fibonacci_telemetry::config::{ServiceConfig, Variant};
use fibonacci_telemetry::observability::metrics::{InvocationDimension, InvocationRecorder};
use fibonacci_telemetry::observability::TelemetryContext;
use fibonacci_telemetry::{HttpServer, Shutdown};

/// Recorder that remembers every call.
#[derive(Default)]
pub struct CountingRecorder {
    pub durations: Mutex<Vec<(f64, Vec<KeyValue>)>>,
    pub invocations: Mutex<Vec<Vec<KeyValue>>>,
    pub active: Mutex<i64>,
}

impl InvocationRecorder for CountingRecorder {
    fn record_duration(&self, ms: f64, labels: &[KeyValue]) {
        self.durations.lock().push((ms, labels.to_vec()));
    }

    fn record_invocation(&self, labels: &[KeyValue]) {
        self.invocations.lock().push(labels.to_vec());
    }

    fn request_started(&self, _labels: &[KeyValue]) {
        *self.active.lock() += 1;
    }

    fn request_finished(&self, _labels: &[KeyValue]) {
        *self.active.lock() -= 1;
    }
}

/// Value of `key` in a label list.
pub fn label(labels: &[KeyValue], key: &str) -> Option<Value> {
    labels
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

/// Value of a span attribute.
pub fn attribute(span: &SpanData, key: &str) -> Option<Value> {
    label(&span.attributes, key)
}

/// Telemetry wired to an in-memory span exporter and a counting recorder.
pub struct Harness {
    pub context: TelemetryContext,
    pub spans: InMemorySpanExporter,
    pub provider: SdkTracerProvider,
    pub recorder: Arc<CountingRecorder>,
}

impl Harness {
    pub fn new(variant: Variant) -> Self {
        let spans = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(spans.clone())
            .build();
        let recorder = Arc::new(CountingRecorder::default());
        let context = TelemetryContext::new(
            provider.tracer("test"),
            recorder.clone(),
            InvocationDimension::for_variant(variant),
        );
        Self {
            context,
            spans,
            provider,
            recorder,
        }
    }

    pub fn config(variant: Variant) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.service.variant = variant;
        config
    }

    pub fn router(&self, variant: Variant) -> Router {
        fibonacci_telemetry::http::build_router(&Self::config(variant), self.context.clone())
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().unwrap()
    }

    /// The finished server span, panicking unless there is exactly one.
    pub fn server_span(&self) -> SpanData {
        let servers: Vec<_> = self
            .finished_spans()
            .into_iter()
            .filter(|s| s.span_kind == SpanKind::Server)
            .collect();
        assert_eq!(servers.len(), 1, "expected one server span");
        servers.into_iter().next().unwrap()
    }
}

/// Send one request through the router and decode a JSON body.
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Json) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Json::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

pub async fn get(router: Router, uri: &str) -> (StatusCode, Json) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// Start a real server on an ephemeral port.
pub async fn start_server(config: ServiceConfig, context: TelemetryContext) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, context);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;
    (addr, shutdown)
}

/// OTLP/HTTP collector double. Accepts only JSON bodies with the OTLP
/// envelope of the signal they were posted to.
#[derive(Clone)]
pub struct Collector {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<(String, Json)>>>,
    rejected: Arc<Mutex<Vec<String>>>,
}

#[derive(Clone)]
struct CollectorState {
    received: Arc<Mutex<Vec<(String, Json)>>>,
    rejected: Arc<Mutex<Vec<String>>>,
    reply: StatusCode,
}

impl Collector {
    pub async fn start() -> Self {
        Self::start_replying(StatusCode::OK).await
    }

    /// Collector that checks every payload but answers with `reply`.
    pub async fn start_replying(reply: StatusCode) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let rejected = Arc::new(Mutex::new(Vec::new()));
        let state = CollectorState {
            received: received.clone(),
            rejected: rejected.clone(),
            reply,
        };
        let app = Router::new()
            .route("/v1/{signal}", post(collect))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            addr,
            received,
            rejected,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Telemetry settings exporting OTLP to this collector.
    pub fn telemetry_config(&self, export_interval_ms: u64) -> TelemetryConfig {
        TelemetryConfig {
            endpoint: self.endpoint(),
            sink: SinkKind::Otlp,
            export_interval_ms,
            instance_id: Some("test-instance".into()),
            ..TelemetryConfig::default()
        }
    }

    /// Accepted payloads posted to `/v1/<signal>`.
    pub fn payloads(&self, signal: &str) -> Vec<Json> {
        self.received
            .lock()
            .iter()
            .filter(|(s, _)| s == signal)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Reasons for every payload that failed the OTLP shape checks.
    pub fn rejected(&self) -> Vec<String> {
        self.rejected.lock().clone()
    }
}

async fn collect(
    State(state): State<CollectorState>,
    Path(signal): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    match check_envelope(&signal, &headers, &body) {
        Ok(json) => {
            state.received.lock().push((signal, json));
            state.reply
        }
        Err(reason) => {
            state.rejected.lock().push(reason);
            StatusCode::BAD_REQUEST
        }
    }
}

fn check_envelope(signal: &str, headers: &HeaderMap, body: &[u8]) -> Result<Json, String> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("application/json") {
        return Err(format!("{}: content-type {:?}", signal, content_type));
    }
    let json: Json = serde_json::from_slice(body).map_err(|e| format!("{}: {}", signal, e))?;

    let (resources, scopes, items) = match signal {
        "traces" => ("resourceSpans", "scopeSpans", "spans"),
        "metrics" => ("resourceMetrics", "scopeMetrics", "metrics"),
        "logs" => ("resourceLogs", "scopeLogs", "logRecords"),
        other => return Err(format!("unknown signal {}", other)),
    };
    let resources = json[resources]
        .as_array()
        .ok_or_else(|| format!("{}: missing {}", signal, resources))?;
    for resource in resources {
        if key_value(&resource["resource"]["attributes"], "service.name").is_none() {
            return Err(format!("{}: resource without service.name", signal));
        }
        let scopes = resource[scopes]
            .as_array()
            .ok_or_else(|| format!("{}: missing {}", signal, scopes))?;
        for scope in scopes {
            let items = scope[items]
                .as_array()
                .ok_or_else(|| format!("{}: missing {}", signal, items))?;
            if signal == "metrics" {
                for metric in items {
                    check_metric(metric)?;
                }
            }
        }
    }
    Ok(json)
}

fn check_metric(metric: &Json) -> Result<(), String> {
    let name = metric["name"].as_str().unwrap_or("<unnamed>");
    if metric.get("sum").is_some() || metric.get("histogram").is_some() {
        if temporality(metric).is_none() {
            return Err(format!("metric {} without aggregationTemporality", name));
        }
    } else if metric.get("gauge").is_none() {
        return Err(format!("metric {} has no sum, histogram or gauge", name));
    }
    Ok(())
}

/// Decoded `AnyValue` of `key` in an OTLP attribute list.
pub fn key_value(attributes: &Json, key: &str) -> Option<Json> {
    attributes
        .as_array()?
        .iter()
        .find(|kv| kv["key"] == key)
        .and_then(|kv| any_value(&kv["value"]))
}

/// Plain JSON for an OTLP `AnyValue`; 64-bit integers may arrive as strings.
pub fn any_value(value: &Json) -> Option<Json> {
    if let Some(s) = value.get("stringValue") {
        return Some(s.clone());
    }
    if let Some(b) = value.get("boolValue") {
        return Some(b.clone());
    }
    if let Some(i) = value.get("intValue") {
        return as_i64(i).map(Json::from);
    }
    if let Some(d) = value.get("doubleValue") {
        return Some(d.clone());
    }
    value.get("value").and_then(any_value)
}

pub fn as_i64(value: &Json) -> Option<i64> {
    value.as_i64().or_else(|| value.as_str()?.parse().ok())
}

pub fn as_u64(value: &Json) -> Option<u64> {
    value.as_u64().or_else(|| value.as_str()?.parse().ok())
}

pub fn resource_attribute(payload: &Json, signal_key: &str, key: &str) -> Option<Json> {
    key_value(&payload[signal_key][0]["resource"]["attributes"], key)
}

fn flatten(payloads: &[Json], resources: &str, scopes: &str, items: &str) -> Vec<Json> {
    payloads
        .iter()
        .flat_map(|p| p[resources].as_array().cloned().unwrap_or_default())
        .flat_map(|r| r[scopes].as_array().cloned().unwrap_or_default())
        .flat_map(|s| s[items].as_array().cloned().unwrap_or_default())
        .collect()
}

pub fn spans(payloads: &[Json]) -> Vec<Json> {
    flatten(payloads, "resourceSpans", "scopeSpans", "spans")
}

pub fn server_spans(payloads: &[Json]) -> Vec<Json> {
    spans(payloads)
        .into_iter()
        .filter(|s| s["kind"] == 2 || s["kind"] == "SPAN_KIND_SERVER")
        .collect()
}

pub fn log_records(payloads: &[Json]) -> Vec<Json> {
    flatten(payloads, "resourceLogs", "scopeLogs", "logRecords")
}

/// Every exported instance of the metric `name`, in export order.
pub fn metrics(payloads: &[Json], name: &str) -> Vec<Json> {
    flatten(payloads, "resourceMetrics", "scopeMetrics", "metrics")
        .into_iter()
        .filter(|m| m["name"] == name)
        .collect()
}

pub fn data_points(metric: &Json) -> Vec<Json> {
    ["sum", "histogram", "gauge"]
        .iter()
        .find_map(|kind| metric[kind]["dataPoints"].as_array().cloned())
        .unwrap_or_default()
}

/// `DELTA` or `CUMULATIVE` for sums and histograms.
pub fn temporality(metric: &Json) -> Option<&'static str> {
    let value = ["sum", "histogram"]
        .iter()
        .find_map(|kind| metric.get(*kind).and_then(|m| m.get("aggregationTemporality")))?;
    match (value.as_i64(), value.as_str()) {
        (Some(1), _) | (_, Some("AGGREGATION_TEMPORALITY_DELTA")) => Some("DELTA"),
        (Some(2), _) | (_, Some("AGGREGATION_TEMPORALITY_CUMULATIVE")) => Some("CUMULATIVE"),
        _ => None,
    }
}

/// Integer value of a sum data point.
pub fn point_value(point: &Json) -> Option<i64> {
    point.get("asInt").and_then(as_i64)
}

/// Sum of `metric`'s integer points whose `key` attribute equals `value`.
pub fn sum_where(metrics: &[Json], key: &str, value: &Json) -> i64 {
    metrics
        .iter()
        .flat_map(data_points)
        .filter(|p| key_value(&p["attributes"], key).as_ref() == Some(value))
        .filter_map(|p| point_value(&p))
        .sum()
}

/// Total observation count over every exported histogram point.
pub fn histogram_count(metrics: &[Json]) -> u64 {
    metrics
        .iter()
        .flat_map(data_points)
        .filter_map(|p| as_u64(&p["count"]))
        .sum()
}
