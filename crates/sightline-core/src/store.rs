//! The device table.
//!
//! [`DeviceStore`] is the single source of truth for which devices are
//! currently visible. It applies per-device throttling, smooths RSSI
//! readings and evicts devices that have gone quiet. The store is not
//! synchronised on its own; [`crate::engine`] owns it exclusively and feeds
//! it one event at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::TrackingConfig;
use crate::filter::AcceptedSighting;
use crate::signal::SignalStrength;
use crate::types::{ConnectionState, DeviceId, DeviceView};

/// A device in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedDevice {
    /// Device identifier.
    pub id: DeviceId,
    /// Name resolved by the filter.
    pub display_name: String,
    /// Averaged RSSI, always `<= 0`.
    pub smoothed_signal: i16,
    /// Time of the most recent accepted sighting.
    pub last_seen_at: Instant,
    /// Connection state last reported by the transport.
    pub connection_state: ConnectionState,
    /// Insertion sequence, used to order newcomers deterministically.
    pub discovered_seq: u64,
}

impl TrackedDevice {
    /// Signal tier of the smoothed reading.
    #[must_use]
    pub const fn signal_strength(&self) -> SignalStrength {
        SignalStrength::from_rssi(self.smoothed_signal)
    }

    /// Presentation view of this device.
    #[must_use]
    pub fn to_view(&self) -> DeviceView {
        let tier = self.signal_strength();
        DeviceView {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            smoothed_signal: self.smoothed_signal,
            bars: tier.bars(),
            tier,
            color: tier.color(),
            connection_state: self.connection_state,
        }
    }
}

/// What [`DeviceStore::record_sighting`] did with a sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First accepted sighting of this id.
    Inserted,
    /// Existing entry updated; carries the new smoothed value.
    Updated {
        /// Smoothed RSSI after averaging.
        smoothed_signal: i16,
    },
    /// Dropped because the previous accepted sighting is too recent.
    Throttled,
}

impl RecordOutcome {
    /// Whether the table changed.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        !matches!(self, Self::Throttled)
    }
}

/// Immutable copy of the table at one point in time.
///
/// Cheap to clone; it shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    devices: Arc<HashMap<DeviceId, TrackedDevice>>,
}

impl DeviceSnapshot {
    /// Look up a device.
    #[must_use]
    pub fn get(&self, id: &DeviceId) -> Option<&TrackedDevice> {
        self.devices.get(id)
    }

    /// Whether `id` is present.
    #[must_use]
    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    /// Number of devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the table was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices in discovery order (oldest insertion first).
    #[must_use]
    pub fn in_discovery_order(&self) -> Vec<&TrackedDevice> {
        let mut devices: Vec<&TrackedDevice> = self.devices.values().collect();
        devices.sort_by_key(|d| d.discovered_seq);
        devices
    }
}

/// Keyed table of tracked devices.
#[derive(Debug)]
pub struct DeviceStore {
    devices: HashMap<DeviceId, TrackedDevice>,
    min_update_interval: Duration,
    next_seq: u64,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new(&TrackingConfig::default())
    }
}

impl DeviceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            devices: HashMap::new(),
            min_update_interval: config.min_update_interval,
            next_seq: 0,
        }
    }

    /// Throttled, smoothed upsert.
    ///
    /// A sighting arriving less than `min_update_interval` after the last
    /// accepted one for the same id is dropped and does not refresh
    /// `last_seen_at`. A device whose sightings are all throttled can
    /// therefore go stale while still in range; this is intended and pinned
    /// by `test_throttled_sighting_does_not_refresh_last_seen`.
    pub fn record_sighting(&mut self, sighting: AcceptedSighting) -> RecordOutcome {
        let AcceptedSighting {
            id,
            name,
            rssi,
            seen_at,
        } = sighting;
        let rssi = crate::filter::normalize_rssi(rssi);

        if let Some(existing) = self.devices.get_mut(&id) {
            if seen_at.saturating_duration_since(existing.last_seen_at) < self.min_update_interval
            {
                return RecordOutcome::Throttled;
            }

            existing.smoothed_signal = smooth(existing.smoothed_signal, rssi);
            existing.display_name = name;
            existing.last_seen_at = seen_at;
            return RecordOutcome::Updated {
                smoothed_signal: existing.smoothed_signal,
            };
        }

        let discovered_seq = self.next_seq;
        self.next_seq += 1;
        self.devices.insert(
            id.clone(),
            TrackedDevice {
                id,
                display_name: name,
                smoothed_signal: rssi,
                last_seen_at: seen_at,
                connection_state: ConnectionState::NotConnected,
                discovered_seq,
            },
        );
        RecordOutcome::Inserted
    }

    /// Remove every device unseen for at least `timeout`, unless connected.
    ///
    /// Returns the evicted ids.
    pub fn evict_stale(&mut self, now: Instant, timeout: Duration) -> Vec<DeviceId> {
        let mut evicted = Vec::new();
        self.devices.retain(|id, device| {
            let fresh = now.saturating_duration_since(device.last_seen_at) < timeout;
            let pinned = device.connection_state == ConnectionState::Connected;
            if fresh || pinned {
                true
            } else {
                evicted.push(id.clone());
                false
            }
        });
        evicted
    }

    /// Record a connection state reported by the transport.
    ///
    /// Returns `false` for unknown ids, which are ignored.
    pub fn set_connection_state(&mut self, id: &DeviceId, state: ConnectionState) -> bool {
        match self.devices.get_mut(id) {
            Some(device) => {
                device.connection_state = state;
                true
            }
            None => false,
        }
    }

    /// The device currently holding the connection slot, if any.
    #[must_use]
    pub fn active_connection(&self) -> Option<&TrackedDevice> {
        self.devices
            .values()
            .find(|d| d.connection_state.is_active())
    }

    /// Drop every device.
    pub fn reset(&mut self) {
        self.devices.clear();
    }

    /// Look up a device.
    #[must_use]
    pub fn get(&self, id: &DeviceId) -> Option<&TrackedDevice> {
        self.devices.get(id)
    }

    /// Number of tracked devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Immutable copy of the current table.
    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            devices: Arc::new(self.devices.clone()),
        }
    }
}

/// `floor((previous + reading) / 2)`, computed without overflow.
#[must_use]
pub fn smooth(previous: i16, reading: i16) -> i16 {
    let averaged = (i32::from(previous) + i32::from(reading)).div_euclid(2);
    i16::try_from(averaged).unwrap_or(i16::MIN)
}
