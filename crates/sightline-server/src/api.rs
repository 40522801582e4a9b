//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `devices` - The live device list and connection pass-through
//! - `scan` - Scan lifecycle and engine status
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

pub mod devices;
pub mod error;
pub mod health;
pub mod openapi;
pub mod scan;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                      - Health check
/// /api
/// ├── /devices                 - Live device list (?order=discovery|signal)
/// ├── /devices/{id}/connect    - Connection request
/// ├── /devices/{id}/disconnect - Disconnect request
/// ├── /scan                    - Engine status, start, stop
/// └── /openapi.json            - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/devices", get(devices::list_devices))
                .route("/devices/{id}/connect", post(devices::connect_device))
                .route("/devices/{id}/disconnect", post(devices::disconnect_device))
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/scan", scan::router()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::Value;
    use sightline_core::engine::{DiscoveryEngine, EngineHandle, EventSink};
    use sightline_core::transport::mock::{MockTransport, TransportCall};
    use sightline_core::{ConnectionState, RawSighting, SightlineConfig};

    use super::*;
    use crate::state::AppState;

    struct Fixture {
        server: TestServer,
        engine: EngineHandle,
        transport: Arc<MockTransport>,
    }

    fn fixture() -> Fixture {
        let config = SightlineConfig::default();
        let transport = Arc::new(MockTransport::powered());
        let (sink, inbox) = EventSink::channel(config.engine.queue_capacity);
        let engine = DiscoveryEngine::spawn(config.clone(), transport.clone(), sink, inbox);
        let server = TestServer::new(create_router(AppState::new(engine.clone(), config)))
            .unwrap();
        Fixture {
            server,
            engine,
            transport,
        }
    }

    async fn see(engine: &EngineHandle, id: &str, name: &str, rssi: i16) {
        engine
            .sink()
            .sighting(RawSighting::now(id, Some(name.to_string()), rssi))
            .await
            .unwrap();
    }

    fn device_ids(body: &Value) -> Vec<&str> {
        body["devices"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_health_reports_running_engine() {
        let f = fixture();
        let response = f.server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["engine_running"], true);
    }

    #[tokio::test]
    async fn test_devices_in_discovery_and_signal_order() {
        let f = fixture();
        see(&f.engine, "weak", "Weak", -69).await;
        see(&f.engine, "strong", "Strong", -40).await;
        f.engine.status().await.unwrap();

        let body: Value = f.server.get("/api/devices").await.json();
        assert_eq!(device_ids(&body), vec!["weak", "strong"]);
        assert_eq!(body["order"], "discovery");
        assert_eq!(body["devices"][1]["bars"], 5);
        assert_eq!(body["devices"][1]["tier"], "excellent");

        let body: Value = f
            .server
            .get("/api/devices")
            .add_query_param("order", "signal")
            .await
            .json();
        assert_eq!(device_ids(&body), vec!["strong", "weak"]);
    }

    #[tokio::test]
    async fn test_unknown_order_is_json_400() {
        let f = fixture();
        let response = f
            .server
            .get("/api/devices")
            .add_query_param("order", "alphabetical")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_order");
        assert!(body["message"].as_str().unwrap().contains("signal"));
    }

    #[tokio::test]
    async fn test_connect_unknown_device_is_404() {
        let f = fixture();
        let response = f.server.post("/api/devices/ghost/connect").await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"], "device_not_found");
    }

    #[tokio::test]
    async fn test_connect_is_forwarded_then_busy() {
        let f = fixture();
        see(&f.engine, "A", "Alpha", -50).await;
        see(&f.engine, "B", "Beta", -50).await;

        let response = f.server.post("/api/devices/A/connect").await;
        response.assert_status(StatusCode::ACCEPTED);
        assert_eq!(f.transport.count(&TransportCall::Connect("A".into())), 1);

        f.engine
            .sink()
            .connection_state_changed("A".into(), ConnectionState::Connected)
            .await
            .unwrap();

        let response = f.server.post("/api/devices/B/connect").await;
        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "connection_busy");
        assert_eq!(body["details"]["active"], "A");
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected_is_noop() {
        let f = fixture();
        see(&f.engine, "A", "Alpha", -50).await;

        let response = f.server.post("/api/devices/A/disconnect").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["outcome"], "not_connected");
        assert_eq!(f.transport.count(&TransportCall::Disconnect("A".into())), 0);
    }

    #[tokio::test]
    async fn test_scan_stop_and_start() {
        let f = fixture();

        let body: Value = f.server.post("/api/scan/stop").await.json();
        assert_eq!(body["state"], "idle");
        assert_eq!(body["scan_requested"], false);

        let body: Value = f.server.post("/api/scan/start").await.json();
        assert_eq!(body["state"], "scanning");

        let body: Value = f.server.get("/api/scan").await.json();
        assert_eq!(body["transport"], "mock");
        assert_eq!(body["mode"], "continuous_with_restart");
        assert_eq!(body["eviction_interval_secs"], 5.0);
        assert_eq!(body["stale_timeout_secs"], 6.0);
        assert_eq!(body["min_update_interval_secs"], 1.0);
    }

    #[tokio::test]
    async fn test_engine_gone_is_503() {
        let f = fixture();
        f.engine.shutdown().await.unwrap();
        while !f.engine.is_stopped() {
            tokio::task::yield_now().await;
        }

        let response = f.server.get("/api/scan").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_openapi_is_served() {
        let f = fixture();
        let response = f.server.get("/api/openapi.json").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["info"]["title"], "sightline API");
    }
}
