//! Startup orchestration.
//!
//! # Responsibilities
//! - Register instruments on the already started telemetry pipeline
//! - Bind the listener last, then serve until a shutdown signal
//! - Flush telemetry once the server has drained
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and happens before the bind
//! - Subsystems initialize in order, not concurrently
//! - The pipeline is not a shutdown subscriber; it is flushed after the
//!   last in-flight request has recorded its span and metrics

use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServiceConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{metrics, TelemetryContext};
use crate::telemetry::{TelemetryError, TelemetryPipeline};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("telemetry initialization failed: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the service until SIGINT/SIGTERM.
pub async fn run(config: ServiceConfig, pipeline: TelemetryPipeline) -> Result<(), StartupError> {
    tracing::info!(
        sink = ?config.telemetry.sink,
        endpoint = %config.telemetry.endpoint,
        service = %config.service.name,
        temporality = ?config.telemetry.temporality,
        "Telemetry pipeline configured"
    );
    let telemetry = TelemetryContext::from_pipeline(&pipeline, config.service.variant);

    if config.prometheus.enabled {
        let addr: SocketAddr = config.prometheus.address.parse().map_err(|e: std::net::AddrParseError| {
            StartupError::Address {
                address: config.prometheus.address.clone(),
                reason: e.to_string(),
            }
        })?;
        metrics::init_prometheus(addr)?;
    }

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;

    tracing::info!(
        address = %address,
        service = %config.service.name,
        instance = %pipeline.instance_id().unwrap_or_default(),
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    let signal_handler = signals::spawn_signal_handler(&shutdown);
    let served = serve(HttpServer::new(config, telemetry), listener, pipeline, &shutdown).await;
    signal_handler.abort();
    served
}

/// Serve until `shutdown` fires, drain, then flush and stop telemetry.
pub async fn serve(
    server: HttpServer,
    listener: TcpListener,
    pipeline: TelemetryPipeline,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    let served = server.run(listener, shutdown.subscribe()).await;
    pipeline.shutdown().await;

    tracing::info!("Shutdown complete");
    served.map_err(StartupError::Serve)
}
