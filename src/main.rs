//! Instrumented Fibonacci service (v1)
//!
//! A small HTTP service whose real payload is its request instrumentation.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ TraceLayer ─▶ CatchPanic ─▶ Timeout ─▶ instrumentation ─▶ handler
//!                                                              │                  │
//!                                                  server span │     child span   │
//!                                                   + metrics  ▼                  ▼
//!                                                     ┌──────────────────────────────┐
//!                                                     │  SDK tracer / meter / logger │
//!                                                     └──────────────┬───────────────┘
//!                                                                    │ bounded queues
//!                                                                    ▼
//!                                                     batch processors + periodic reader
//!                                                                    │
//!                                                                    ▼
//!                                                     exporter (otlp | console | none)
//! ```

use clap::Parser;
use std::path::PathBuf;

use fibonacci_telemetry::config::{load_config, Overrides, Variant};
use fibonacci_telemetry::lifecycle::startup;
use fibonacci_telemetry::observability::logging;
use fibonacci_telemetry::telemetry::TelemetryPipeline;

#[derive(Debug, Parser)]
#[command(name = "fibonacci-server", version)]
#[command(about = "Fibonacci HTTP service with request tracing and metrics", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "FIBONACCI_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP surface to serve (classic or guided)
    #[arg(long)]
    variant: Option<Variant>,

    /// Bind address, e.g. 0.0.0.0:8080
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = Overrides {
        variant: cli.variant,
        bind_address: cli.bind,
    };
    let config = load_config(cli.config.as_deref(), &overrides)?;

    let pipeline = TelemetryPipeline::start(&config.telemetry, &config.service.name)?;
    logging::init(&config.logging, pipeline.logger_provider())?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fibonacci-server starting");
    tracing::info!(
        variant = %config.service.variant,
        bind_address = %config.bind_address(),
        sink = ?config.telemetry.sink,
        export_interval_ms = config.telemetry.export_interval_ms,
        "Configuration loaded"
    );

    if let Err(e) = startup::run(config, pipeline).await {
        tracing::error!(error = %e, "Fatal startup error");
        return Err(e.into());
    }
    Ok(())
}
