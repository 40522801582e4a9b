//! OpenAPI specification generation for the sightline API.
//!
//! The document is served at `/api/openapi.json` and written to disk by the
//! `gen-openapi` binary for client generation.

use axum::Json;
use sightline_core::engine::EngineStatus;
use sightline_core::scheduler::SchedulerState;
use sightline_core::signal::{ColorHint, SignalStrength};
use sightline_core::types::{ConnectionState, DeviceId, DeviceView};
use sightline_core::ViewOrder;
use utoipa::OpenApi;

use super::devices::{ConnectionResponse, DevicesResponse};
use super::error::ErrorResponse;
use super::scan::ScanStatusResponse;
use super::health::HealthResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for sightline.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "sightline API",
        version = "0.1.0",
        description = r#"
# sightline API

sightline watches Bluetooth Low Energy advertisements and keeps a stable,
flicker-free list of the devices nearby.

## Overview

1. **Devices**: the live list. Devices keep their position between updates;
   new ones are appended. Signal readings are smoothed and rate limited.
2. **Connections**: forward connect and disconnect requests to the radio.
   One device may hold a connection at a time.
3. **Scan**: start and stop scanning, inspect the scheduler.

Devices that have not been heard from for a few seconds drop off the list
unless they are connected.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local sightline server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "devices", description = "Nearby device list and connection requests"),
        (name = "scan", description = "Scan lifecycle and scheduler status")
    ),
    paths(
        super::health::health_check,
        super::devices::list_devices,
        super::devices::connect_device,
        super::devices::disconnect_device,
        super::scan::get_scan_status,
        super::scan::start_scan,
        super::scan::stop_scan,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Device types
            DevicesResponse,
            ConnectionResponse,
            DeviceView,
            DeviceId,
            SignalStrength,
            ColorHint,
            ConnectionState,
            ViewOrder,
            // Scan types
            EngineStatus,
            ScanStatusResponse,
            SchedulerState,
        )
    )
)]
pub struct ApiDoc;
