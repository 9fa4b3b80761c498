//! Request instrumentation middleware.
//!
//! # Responsibilities
//! - Start a server span per request, continuing an inbound `traceparent`
//! - Run the handler with the span's context attached, so child spans and
//!   bridged log records join the request trace
//! - Observe the response status through `ResponseStatusCapture`
//! - Record request duration and one invocation per request
//! - Close the span on every exit path, including cancellation
//!
//! # Design Decisions
//! - A drop guard owns the request's OpenTelemetry context and the start
//!   instant; it finalises exactly once, either with the observed status or
//!   as an aborted request
//! - The handler's body streams through untouched; only the head is replayed
//!   through the capture
//! - Mounted with `route_layer`, so `MatchedPath` is always the route template

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use opentelemetry::trace::{FutureExt, SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use std::time::Instant;
use tracing::Instrument;

use crate::http::capture::{ResponseAssembler, ResponseSink, ResponseStatusCapture};
use crate::observability::TelemetryContext;

/// Span error message for a request whose future was dropped before a response existed.
pub const ABORTED_MESSAGE: &str = "request aborted before a response was produced";

pub async fn instrument_request(
    State(telemetry): State<TelemetryContext>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();

    let method = request.method().as_str().to_owned();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let host = request_host(&request);

    let parent = telemetry.extract_parent(request.headers());

    let mut attributes = vec![
        KeyValue::new("http.method", method.clone()),
        KeyValue::new("http.route", route.clone()),
        KeyValue::new("http.target", target(&request)),
        KeyValue::new("http.scheme", request.uri().scheme_str().unwrap_or("http").to_owned()),
        KeyValue::new("net.host.name", host.clone()),
    ];
    if let Some(agent) = request.headers().get(header::USER_AGENT).and_then(|v| v.to_str().ok()) {
        attributes.push(KeyValue::new("http.user_agent", agent.to_owned()));
    }

    let span = telemetry
        .tracer()
        .span_builder(format!("{} {}", method, route))
        .with_kind(SpanKind::Server)
        .with_attributes(attributes)
        .start_with_context(telemetry.tracer(), &parent);
    let cx = parent.with_span(span);
    let (trace_id, span_id) = {
        let span = cx.span();
        let span_context = span.span_context();
        (span_context.trace_id(), span_context.span_id())
    };

    let base_labels = vec![
        KeyValue::new("http.method", method.clone()),
        KeyValue::new("http.route", route.clone()),
        KeyValue::new("net.host.name", host),
    ];
    let observation = RequestObservation::start(telemetry, cx.clone(), route.clone(), base_labels, start);

    request.extensions_mut().insert(cx.clone());
    let log_span = tracing::info_span!(
        "request",
        method = %method,
        route = %route,
        trace_id = %trace_id,
        span_id = %span_id,
    );

    let response = next.run(request).with_context(cx).instrument(log_span).await;

    // axum hands the finished response back instead of exposing writes, so the
    // status is observed by replaying the head through the capture and reading
    // back what it saw.
    let (parts, body) = response.into_parts();
    let status = parts.status;
    let mut capture = ResponseStatusCapture::new(ResponseAssembler::with_head(parts));
    capture.write_header(status);
    capture.write_body(body);

    observation.complete(capture.observed_status());
    capture.into_inner().finish()
}

fn request_host(request: &Request<Body>) -> String {
    request
        .uri()
        .host()
        .map(str::to_owned)
        .or_else(|| {
            request
                .headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(|h| h.rsplit_once(':').map_or(h, |(name, _)| name).to_owned())
        })
        .unwrap_or_else(|| "unknown".to_owned())
}

fn target(request: &Request<Body>) -> String {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned())
}

enum Outcome {
    Completed(StatusCode),
    Aborted,
}

struct InFlight {
    telemetry: TelemetryContext,
    cx: Context,
    route: String,
    labels: Vec<KeyValue>,
    start: Instant,
}

impl InFlight {
    fn finish(mut self, outcome: Outcome) {
        let _attached = self.cx.clone().attach();
        let elapsed_ms = self.start.elapsed().as_nanos() as f64 / 1e6;
        let recorder = self.telemetry.recorder();
        recorder.request_finished(&active_labels(&self.labels));
        let span = self.cx.span();

        let invocation = match outcome {
            Outcome::Completed(status) => {
                let code = i64::from(status.as_u16());
                span.set_attribute(KeyValue::new("http.status_code", code));
                if status.as_u16() >= 400 {
                    span.set_status(Status::error(format!(
                        "{} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    )));
                }
                self.labels.push(KeyValue::new("http.status_code", code));
                self.telemetry.dimension().label(status)
            }
            Outcome::Aborted => {
                span.set_attribute(KeyValue::new("request.aborted", true));
                span.set_status(Status::error(ABORTED_MESSAGE));
                tracing::warn!(
                    route = %self.route,
                    elapsed_ms,
                    "Request aborted before a response was produced"
                );
                let aborted = KeyValue::new("request.aborted", true);
                self.labels.push(aborted.clone());
                aborted
            }
        };

        recorder.record_duration(elapsed_ms, &self.labels);
        recorder.record_invocation(&[invocation]);
        span.end();
    }
}

fn active_labels(labels: &[KeyValue]) -> Vec<KeyValue> {
    labels
        .iter()
        .filter(|kv| matches!(kv.key.as_str(), "http.method" | "http.route"))
        .cloned()
        .collect()
}

/// Finalises request telemetry exactly once: on `complete`, or on drop.
struct RequestObservation {
    in_flight: Option<InFlight>,
}

impl RequestObservation {
    fn start(
        telemetry: TelemetryContext,
        cx: Context,
        route: String,
        labels: Vec<KeyValue>,
        start: Instant,
    ) -> Self {
        telemetry.recorder().request_started(&active_labels(&labels));
        Self {
            in_flight: Some(InFlight {
                telemetry,
                cx,
                route,
                labels,
                start,
            }),
        }
    }

    fn complete(mut self, status: StatusCode) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.finish(Outcome::Completed(status));
        }
    }
}

impl Drop for RequestObservation {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.finish(Outcome::Aborted);
        }
    }
}
