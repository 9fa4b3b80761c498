//! Request handlers for both HTTP surfaces.
//!
//! # Responsibilities
//! - Validate the query input and compute the result
//! - Record the computation as an internal child span of the request span
//! - Map input problems to `400` with the surface's error body
//!
//! # Design Decisions
//! - The request's OpenTelemetry context arrives as an extension set by the
//!   instrumentation middleware
//! - Handlers write any status they like; the middleware never inspects bodies

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use opentelemetry::trace::{Span, Status, Tracer};
use opentelemetry::{Context, KeyValue};
use serde::{Deserialize, Serialize};

use crate::fibonacci::{fibonacci, MAX_N, MIN_N};
use crate::http::server::AppState;

pub const MISSING_N: &str = "parameter 'n' not specified";
pub const CALCULATION_SUCCEEDED: &str = "Fibonacci is calculated successfully.";
pub const INPUT_COULD_NOT_BE_PARSED: &str = "Input could not be parsed.";
pub const INPUT_IS_OUTSIDE_OF_RANGE: &str = "Input is outside of the range [1,90].";

#[derive(Debug, Deserialize)]
pub struct ClassicParams {
    n: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassicResponse {
    pub n: i64,
    pub result: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct GuidedParams {
    num: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuidedResponse {
    pub message: String,
    pub input: Option<u64>,
    pub output: Option<u64>,
}

/// Internal span for the computation; ends when dropped.
fn compute_span(state: &AppState, parent: &Context) -> impl Span {
    state.telemetry.tracer().start_with_context("fibonacci", parent)
}

fn reject(span: &mut impl Span, message: &str) {
    tracing::info!(reason = message, "Rejected fibonacci request");
    span.set_status(Status::error(message.to_string()));
}

/// `GET /fibonacci?n=<int>` and `GET /fib?n=<int>`.
pub async fn classic_fibonacci(
    State(state): State<AppState>,
    Extension(parent): Extension<Context>,
    Query(params): Query<ClassicParams>,
) -> Response {
    let mut span = compute_span(&state, &parent);

    let raw = match params.n {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            reject(&mut span, MISSING_N);
            return classic_error(MISSING_N.to_string());
        }
    };

    let n: i64 = match raw.parse() {
        Ok(n) => n,
        Err(e) => {
            let message = format!("parsing {:?}: {}", raw, e);
            reject(&mut span, &message);
            return classic_error(message);
        }
    };
    span.set_attribute(KeyValue::new("fibonacci.n", n));

    match fibonacci(n) {
        Ok(result) => {
            span.set_attribute(KeyValue::new("fibonacci.result", i64::try_from(result).unwrap_or(i64::MAX)));
            tracing::debug!(n, result, "Fibonacci computed");
            (StatusCode::OK, Json(ClassicResponse { n, result })).into_response()
        }
        Err(e) => {
            let message = e.to_string();
            reject(&mut span, &message);
            classic_error(message)
        }
    }
}

fn classic_error(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
}

/// `GET /?num=<uint>`.
pub async fn guided_fibonacci(
    State(state): State<AppState>,
    Extension(parent): Extension<Context>,
    Query(params): Query<GuidedParams>,
) -> Response {
    let mut span = compute_span(&state, &parent);

    let Some(num) = params.num.as_deref().and_then(|raw| raw.parse::<u64>().ok()) else {
        reject(&mut span, INPUT_COULD_NOT_BE_PARSED);
        return guided_response(StatusCode::BAD_REQUEST, INPUT_COULD_NOT_BE_PARSED, None, None);
    };
    span.set_attribute(KeyValue::new("fibonacci.n", i64::try_from(num).unwrap_or(i64::MAX)));

    let in_range = (MIN_N as u64..=MAX_N as u64).contains(&num);
    match in_range.then(|| fibonacci(num as i64)) {
        Some(Ok(output)) => {
            span.set_attribute(KeyValue::new("fibonacci.result", i64::try_from(output).unwrap_or(i64::MAX)));
            tracing::debug!(num, output, "Fibonacci computed");
            guided_response(StatusCode::OK, CALCULATION_SUCCEEDED, Some(num), Some(output))
        }
        _ => {
            reject(&mut span, INPUT_IS_OUTSIDE_OF_RANGE);
            guided_response(StatusCode::BAD_REQUEST, INPUT_IS_OUTSIDE_OF_RANGE, Some(num), None)
        }
    }
}

fn guided_response(status: StatusCode, message: &str, input: Option<u64>, output: Option<u64>) -> Response {
    (
        status,
        Json(GuidedResponse {
            message: message.to_string(),
            input,
            output,
        }),
    )
        .into_response()
}

/// `GET /health`. Not instrumented.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
