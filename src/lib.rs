//! Instrumented Fibonacci service library.

pub mod config;
pub mod fibonacci;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod telemetry;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::TelemetryContext;
