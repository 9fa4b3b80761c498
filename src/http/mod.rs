//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → middleware/instrumentation.rs (span, status capture, metrics)
//!     → handlers.rs (validate, compute, child span)
//!     → capture.rs (status observed on the way out)
//!     → Send to client
//! ```

pub mod capture;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use capture::{ResponseAssembler, ResponseSink, ResponseStatusCapture};
pub use server::{build_router, AppState, HttpServer};
