//! Response status capture.
//!
//! # Responsibilities
//! - Define the response-writing interface seen by the instrumentation layer
//! - Decorate any writer so the status it was given can be read back later
//!
//! # Design Decisions
//! - The decorator forwards every call unchanged and cannot fail
//! - A status that was never written reads as 200, matching what the
//!   server sends for a response without an explicit status
//! - Last write wins; the assembler keeps the same rule, so the observed
//!   status always equals the one sent

use axum::body::Body;
use axum::http::response::Parts;
use axum::http::StatusCode;
use axum::response::Response;

/// Write side of a response.
pub trait ResponseSink {
    fn write_header(&mut self, status: StatusCode);

    fn write_body(&mut self, body: Body);
}

/// Builds an axum `Response` from header and body writes.
///
/// Headers, version and extensions come from the head it was created with;
/// only the status and body are written.
#[derive(Debug)]
pub struct ResponseAssembler {
    parts: Parts,
    body: Body,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        let (parts, body) = Response::new(Body::empty()).into_parts();
        Self { parts, body }
    }

    /// Start from an existing head, resetting its status to the default.
    pub fn with_head(mut parts: Parts) -> Self {
        parts.status = StatusCode::OK;
        Self {
            parts,
            body: Body::empty(),
        }
    }

    pub fn finish(self) -> Response {
        Response::from_parts(self.parts, self.body)
    }
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for ResponseAssembler {
    fn write_header(&mut self, status: StatusCode) {
        self.parts.status = status;
    }

    fn write_body(&mut self, body: Body) {
        self.body = body;
    }
}

/// Records the status written through it.
#[derive(Debug)]
pub struct ResponseStatusCapture<S> {
    inner: S,
    status: Option<StatusCode>,
}

impl<S: ResponseSink> ResponseStatusCapture<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, status: None }
    }

    /// The last status written, or 200 if none was.
    pub fn observed_status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn status_written(&self) -> bool {
        self.status.is_some()
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ResponseSink> ResponseSink for ResponseStatusCapture<S> {
    fn write_header(&mut self, status: StatusCode) {
        self.status = Some(status);
        self.inner.write_header(status);
    }

    fn write_body(&mut self, body: Body) {
        self.inner.write_body(body);
    }
}
