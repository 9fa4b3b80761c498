//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router for the configured variant
//! - Wire up middleware (instrumentation, timeout, panic recovery, access log)
//! - Bind server to listener
//! - Drain in-flight requests on shutdown

use axum::{http::StatusCode, middleware, routing::get, Router};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ServiceConfig, Variant};
use crate::http::handlers::{classic_fibonacci, guided_fibonacci, health};
use crate::http::middleware::instrument_request;
use crate::observability::TelemetryContext;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub telemetry: TelemetryContext,
    pub variant: Variant,
}

/// HTTP server for the Fibonacci service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServiceConfig, telemetry: TelemetryContext) -> Self {
        let router = build_router(&config, telemetry);
        Self::from_router(router, config)
    }

    /// Serve an already-built router.
    pub fn from_router(router: Router, config: ServiceConfig) -> Self {
        Self { router, config }
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            variant = %self.config.service.variant,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

/// Build the Axum router with all middleware layers.
///
/// Only the Fibonacci routes are instrumented; `/health` and unmatched
/// paths are not.
pub fn build_router(config: &ServiceConfig, telemetry: TelemetryContext) -> Router {
    let variant = config.service.variant;
    let state = AppState {
        telemetry: telemetry.clone(),
        variant,
    };

    let api = match variant {
        Variant::Classic => Router::new()
            .route("/fibonacci", get(classic_fibonacci))
            .route("/fib", get(classic_fibonacci)),
        Variant::Guided => Router::new().route("/", get(guided_fibonacci)),
    };

    api.route_layer(middleware::from_fn_with_state(telemetry, instrument_request))
        .route("/health", get(health))
        .with_state(state)
        .layer(request_timeout(Duration::from_secs(config.service.request_timeout_secs)))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Requests still running after `after` are answered with 408.
fn request_timeout(after: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, after)
}
