//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Telemetry pipeline → Instruments → Prometheus (optional) → Bind → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests → Flush telemetry → Exit
//!     (the telemetry flush waits for `HttpServer::run` to return)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: telemetry first, listener last
//! - Ordered shutdown: stop accept, drain, final export

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
