//! Device list and connection endpoints.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sightline_core::{ConnectOutcome, DeviceId, DeviceView, SightlineError, ViewOrder};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for the device list.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DevicesQuery {
    /// `discovery` (default) for the stable order, `signal` for strongest first.
    pub order: Option<ViewOrder>,
}

/// The current device list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "generation": 42,
    "published_at_utc": "2025-01-15T03:30:00Z",
    "order": "discovery",
    "devices": [
        {
            "id": "AA:BB:CC:DD:EE:FF",
            "display_name": "Heart Rate Strap",
            "smoothed_signal": -52,
            "bars": 5,
            "tier": "excellent",
            "color": "green",
            "connection_state": "not_connected"
        }
    ]
}))]
pub struct DevicesResponse {
    /// Publication counter, bumped on every change.
    #[schema(example = 42)]
    pub generation: u64,

    /// When this list was published.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub published_at_utc: String,

    /// Ordering applied to `devices`.
    pub order: ViewOrder,

    /// Tracked devices.
    pub devices: Vec<DeviceView>,
}

/// Result of a connect or disconnect request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "AA:BB:CC:DD:EE:FF",
    "outcome": "requested"
}))]
pub struct ConnectionResponse {
    /// Target device.
    pub id: DeviceId,

    /// What the engine did with the request: `requested`, `already_connected`
    /// or `not_connected`.
    #[schema(example = "requested")]
    pub outcome: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// List tracked devices.
#[utoipa::path(
    get,
    path = "/devices",
    tag = "devices",
    operation_id = "listDevices",
    summary = "List nearby devices",
    description = "Returns the most recently published device list. The default \
        `discovery` order is stable: devices keep their position and newcomers are \
        appended. `signal` ranks the same list strongest first for display only.",
    params(DevicesQuery),
    responses(
        (status = 200, description = "Current device list", body = DevicesResponse),
        (status = 400, description = "Unknown order", body = ErrorResponse)
    )
)]
pub async fn list_devices(
    State(state): State<SharedState>,
    query: Result<Query<DevicesQuery>, QueryRejection>,
) -> ApiResult<Json<DevicesResponse>> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest {
        error_code: "invalid_order".to_string(),
        message: format!("{}; expected 'discovery' or 'signal'", rejection.body_text()),
    })?;
    let order = query.order.unwrap_or_default();
    let list = state.engine().current();

    let devices = match order {
        ViewOrder::Discovery => list.devices.clone(),
        ViewOrder::Signal => list.ranked_by_signal(),
    };

    Ok(Json(DevicesResponse {
        generation: list.generation,
        published_at_utc: list.published_at_utc.to_rfc3339(),
        order,
        devices,
    }))
}

/// Connect to a tracked device.
#[utoipa::path(
    post,
    path = "/devices/{id}/connect",
    tag = "devices",
    operation_id = "connectDevice",
    summary = "Connect to a device",
    description = "Forwards a connection request to the radio. Only one device may be \
        connecting or connected at a time. The result of the attempt is reflected in \
        the device's `connection_state`.",
    params(("id" = String, Path, description = "Device identifier")),
    responses(
        (status = 202, description = "Request forwarded", body = ConnectionResponse),
        (status = 200, description = "Already connected, nothing to do", body = ConnectionResponse),
        (status = 404, description = "Device is not tracked", body = ErrorResponse),
        (status = 409, description = "Another connection is active or the adapter is off", body = ErrorResponse),
        (status = 503, description = "Engine unavailable", body = ErrorResponse)
    )
)]
pub async fn connect_device(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<ConnectionResponse>)> {
    let id = DeviceId::from(id);
    let outcome = state.engine().connect(id.clone()).await?;
    debug!(device = %id, ?outcome, "Connect requested");
    respond(id, outcome)
}

/// Disconnect from a tracked device.
#[utoipa::path(
    post,
    path = "/devices/{id}/disconnect",
    tag = "devices",
    operation_id = "disconnectDevice",
    summary = "Disconnect from a device",
    description = "Forwards a disconnect request to the radio.",
    params(("id" = String, Path, description = "Device identifier")),
    responses(
        (status = 202, description = "Request forwarded", body = ConnectionResponse),
        (status = 200, description = "Not connected, nothing to do", body = ConnectionResponse),
        (status = 404, description = "Device is not tracked", body = ErrorResponse),
        (status = 409, description = "The adapter is off", body = ErrorResponse),
        (status = 503, description = "Engine unavailable", body = ErrorResponse)
    )
)]
pub async fn disconnect_device(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<ConnectionResponse>)> {
    let id = DeviceId::from(id);
    let outcome = state.engine().disconnect(id.clone()).await?;
    debug!(device = %id, ?outcome, "Disconnect requested");
    respond(id, outcome)
}

fn respond(
    id: DeviceId,
    outcome: ConnectOutcome,
) -> ApiResult<(StatusCode, Json<ConnectionResponse>)> {
    let status = match &outcome {
        ConnectOutcome::Requested => StatusCode::ACCEPTED,
        ConnectOutcome::AlreadyConnected | ConnectOutcome::NotConnected => StatusCode::OK,
        ConnectOutcome::UnknownDevice => {
            return Err(SightlineError::DeviceNotFound(id.to_string()).into());
        }
        ConnectOutcome::AdapterUnavailable => {
            return Err(ApiError::Conflict {
                error_code: "adapter_unavailable".to_string(),
                message: "The Bluetooth adapter is powered off".to_string(),
                details: None,
            });
        }
        ConnectOutcome::Busy { active } => {
            return Err(ApiError::Conflict {
                error_code: "connection_busy".to_string(),
                message: format!("Device '{active}' already holds the connection"),
                details: Some(serde_json::json!({ "active": active })),
            });
        }
    };

    Ok((
        status,
        Json(ConnectionResponse {
            id,
            outcome: outcome.code().to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_request_is_accepted() {
        let (status, Json(body)) = respond("AA".into(), ConnectOutcome::Requested).unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "AA", "outcome": "requested" }));
    }

    #[test]
    fn test_busy_is_conflict() {
        let err = respond("B".into(), ConnectOutcome::Busy { active: "A".into() }).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Conflict { ref error_code, .. } if error_code == "connection_busy"
        ));
    }

    #[test]
    fn test_noop_outcomes_are_ok() {
        let (status, Json(body)) = respond("A".into(), ConnectOutcome::AlreadyConnected).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.outcome, "already_connected");
        let (status, _) = respond("A".into(), ConnectOutcome::NotConnected).unwrap();
        assert_eq!(status, StatusCode::OK);
    }
}
