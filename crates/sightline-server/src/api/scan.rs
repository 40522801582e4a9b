//! Scan lifecycle endpoints.
//!
//! Starting and stopping here is the same hook an app would use on
//! foreground and background transitions.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sightline_core::EngineStatus;
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the scan router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_scan_status))
        .route("/start", post(start_scan))
        .route("/stop", post(stop_scan))
}

/// Engine status plus the configured tracking timings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScanStatusResponse {
    /// Live engine status.
    #[serde(flatten)]
    pub status: EngineStatus,

    /// Seconds between eviction sweeps.
    #[schema(example = 5.0)]
    pub eviction_interval_secs: f64,

    /// Seconds a device may go unseen before it is evicted.
    #[schema(example = 6.0)]
    pub stale_timeout_secs: f64,

    /// Minimum seconds between accepted sightings of one device.
    #[schema(example = 1.0)]
    pub min_update_interval_secs: f64,
}

/// Current engine status.
#[utoipa::path(
    get,
    path = "/scan",
    tag = "scan",
    operation_id = "getScanStatus",
    summary = "Get scan status",
    description = "Returns the scheduler state, scan policy, adapter power, the \
        number of tracked devices and the configured tracking timings.",
    responses(
        (status = 200, description = "Engine status", body = ScanStatusResponse),
        (status = 503, description = "Engine unavailable", body = ErrorResponse)
    )
)]
pub async fn get_scan_status(
    State(state): State<SharedState>,
) -> ApiResult<Json<ScanStatusResponse>> {
    let status = state.engine().status().await?;
    let config = state.config();
    Ok(Json(ScanStatusResponse {
        status,
        eviction_interval_secs: config.scan.eviction_interval.as_secs_f64(),
        stale_timeout_secs: config.tracking.stale_timeout.as_secs_f64(),
        min_update_interval_secs: config.tracking.min_update_interval.as_secs_f64(),
    }))
}

/// Start scanning.
#[utoipa::path(
    post,
    path = "/scan/start",
    tag = "scan",
    operation_id = "startScan",
    summary = "Start scanning",
    description = "Requests scanning. If the adapter is powered off, scanning begins \
        as soon as it powers on. Starting an active scan is a no-op.",
    responses(
        (status = 200, description = "Scan requested", body = EngineStatus),
        (status = 503, description = "Engine unavailable", body = ErrorResponse)
    )
)]
pub async fn start_scan(State(state): State<SharedState>) -> ApiResult<Json<EngineStatus>> {
    let status = state.engine().start().await?;
    info!(state = ?status.state, "Scan start requested over HTTP");
    Ok(Json(status))
}

/// Stop scanning.
#[utoipa::path(
    post,
    path = "/scan/stop",
    tag = "scan",
    operation_id = "stopScan",
    summary = "Stop scanning",
    description = "Stops scanning and cancels all scan and eviction timers. Tracked \
        devices are kept until the next eviction sweep after scanning restarts.",
    responses(
        (status = 200, description = "Scan stopped", body = EngineStatus),
        (status = 503, description = "Engine unavailable", body = ErrorResponse)
    )
)]
pub async fn stop_scan(State(state): State<SharedState>) -> ApiResult<Json<EngineStatus>> {
    let status = state.engine().stop().await?;
    info!("Scan stopped over HTTP");
    Ok(Json(status))
}
