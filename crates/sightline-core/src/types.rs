//! Shared types and OpenAPI schemas.
//!
//! Types that cross module boundaries live here: device identity, connection
//! state and the published device list handed to presentation layers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::signal::{ColorHint, SignalStrength};

/// Opaque, stable identifier of an advertising device.
///
/// For BlueZ this is the MAC address, for simulated devices a UUID. The
/// engine never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "AA:BB:CC:DD:EE:FF")]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Connection state as reported by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none in progress.
    #[default]
    NotConnected,
    /// A connection request is in flight.
    Connecting,
    /// Connected; pinned against eviction.
    Connected,
    /// A disconnect request is in flight.
    Disconnecting,
}

impl ConnectionState {
    /// Whether this state occupies the single connection slot.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// One entry of the published device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "AA:BB:CC:DD:EE:FF",
    "display_name": "Nordic_Blinky",
    "smoothed_signal": -58,
    "bars": 4,
    "tier": "good",
    "color": "green",
    "connection_state": "not_connected"
}))]
pub struct DeviceView {
    /// Device identifier.
    pub id: DeviceId,

    /// Advertised or resolved device name.
    #[schema(example = "Nordic_Blinky")]
    pub display_name: String,

    /// Smoothed RSSI in dBm, always `<= 0`.
    #[schema(example = -58)]
    pub smoothed_signal: i16,

    /// Signal bars (2 to 5).
    #[schema(example = 4)]
    pub bars: u8,

    /// Signal tier.
    pub tier: SignalStrength,

    /// Display colour for the tier.
    pub color: ColorHint,

    /// Current connection state.
    pub connection_state: ConnectionState,
}

/// Ordered device list published after every accepted mutation or sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceList {
    /// Monotonic publish counter; zero before the first publish.
    #[schema(example = 42)]
    pub generation: u64,

    /// Wall-clock time of the publish.
    pub published_at_utc: DateTime<Utc>,

    /// Devices in reconciled (discovery) order.
    pub devices: Vec<DeviceView>,
}

impl Default for DeviceList {
    fn default() -> Self {
        Self {
            generation: 0,
            published_at_utc: Utc::now(),
            devices: Vec::new(),
        }
    }
}

impl DeviceList {
    /// Number of devices in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device ids in published order.
    #[must_use]
    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|d| d.id.clone()).collect()
    }

    /// The same devices ranked by signal, strongest first.
    ///
    /// Display only; the published order is left untouched.
    #[must_use]
    pub fn ranked_by_signal(&self) -> Vec<DeviceView> {
        let mut ranked = self.devices.clone();
        ranked.sort_by(|a, b| {
            crate::reconcile::signal_rank(b.bars, b.smoothed_signal)
                .cmp(&crate::reconcile::signal_rank(a.bars, a.smoothed_signal))
        });
        ranked
    }
}

/// Opaque connection failure reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionFailure {
    /// Device the connection attempt targeted.
    pub id: DeviceId,
    /// Transport-provided reason, passed through uninterpreted.
    pub reason: String,
}
