//! # sightline-server
//!
//! HTTP server for the sightline BLE discovery tracker.
//!
//! This binary provides:
//! - REST API for the live device list, connection requests and scan control
//! - OpenAPI document at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, simulated advertisers
//! cargo run --package sightline-server
//!
//! # Real radio via BlueZ
//! cargo run --package sightline-server --features bluetooth
//! ```
//!
//! `SIGHTLINE_CONFIG` points at a TOML file; `SIGHTLINE__SECTION__KEY`
//! variables override individual settings.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use sightline_core::engine::{DiscoveryEngine, EventSink};
use sightline_core::{SightlineConfig, Transport};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use sightline_server::api;
use sightline_server::logging;
use sightline_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::is_production())?;

    let config_path = std::env::var_os("SIGHTLINE_CONFIG").map(PathBuf::from);
    let config = SightlineConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = config.scan.mode.name(),
        "Starting sightline-server"
    );

    let (sink, inbox) = EventSink::channel(config.engine.queue_capacity);
    let transport = build_transport(sink.clone()).await;
    let engine = DiscoveryEngine::spawn(config.clone(), transport, sink, inbox);

    let app = api::create_router(AppState::new(engine.clone(), config.clone())).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive()),
    );

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;

    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = engine.shutdown().await {
        warn!(error = %e, "Engine already stopped");
    }
    info!("Shut down");

    Ok(())
}

#[cfg(feature = "bluetooth")]
async fn build_transport(sink: EventSink) -> Arc<dyn Transport> {
    use sightline_core::transport::bluez::BluezTransport;
    use sightline_core::transport::simulated::SimulatedTransport;

    match BluezTransport::new(sink.clone()).await {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            warn!(error = %e, "BlueZ unavailable, falling back to simulated devices");
            Arc::new(SimulatedTransport::new(sink))
        }
    }
}

#[cfg(not(feature = "bluetooth"))]
async fn build_transport(sink: EventSink) -> Arc<dyn Transport> {
    use sightline_core::transport::simulated::SimulatedTransport;

    info!("Built without the bluetooth feature, using simulated devices");
    Arc::new(SimulatedTransport::new(sink))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
