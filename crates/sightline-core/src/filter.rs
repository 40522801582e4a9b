//! Sighting admission.
//!
//! Normalises raw advertisement reports and decides whether they may reach
//! the device table. Stateless and deterministic.

use tokio::time::Instant;

use crate::config::FilterConfig;
use crate::types::DeviceId;

/// One raw report from the transport that a device was heard advertising.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSighting {
    /// Identifier of the advertiser.
    pub id: DeviceId,
    /// Name known to the platform for this device (GAP name / alias).
    pub name: Option<String>,
    /// Local name carried in the advertisement payload.
    pub local_name: Option<String>,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// When the advertisement was received.
    pub seen_at: Instant,
}

impl RawSighting {
    /// Build a sighting stamped with the current time.
    pub fn now(id: impl Into<DeviceId>, name: Option<String>, rssi: i16) -> Self {
        Self {
            id: id.into(),
            name,
            local_name: None,
            rssi,
            seen_at: Instant::now(),
        }
    }

    /// Attach the advertised local name.
    #[must_use]
    pub fn with_local_name(mut self, local_name: impl Into<String>) -> Self {
        self.local_name = Some(local_name.into());
        self
    }
}

/// A sighting that passed the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedSighting {
    /// Identifier of the advertiser.
    pub id: DeviceId,
    /// Resolved display name.
    pub name: String,
    /// RSSI clamped to `<= 0`.
    pub rssi: i16,
    /// When the advertisement was received.
    pub seen_at: Instant,
}

/// Why a sighting was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Normalised RSSI below the configured floor.
    BelowThreshold {
        /// Normalised reading.
        rssi: i16,
        /// Floor in effect.
        threshold: i16,
    },
    /// Neither a platform name nor an advertised local name.
    Unnamed,
}

/// Outcome of running a sighting through the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Sighting may be recorded.
    Accepted(AcceptedSighting),
    /// Sighting is dropped silently.
    Rejected(Rejection),
}

/// Stateless admission filter for raw sightings.
#[derive(Debug, Clone, Copy)]
pub struct SightingFilter {
    rssi_threshold: i16,
}

impl Default for SightingFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default().rssi_threshold)
    }
}

impl SightingFilter {
    /// Create a filter that rejects readings below `rssi_threshold` dBm.
    #[must_use]
    pub const fn new(rssi_threshold: i16) -> Self {
        Self { rssi_threshold }
    }

    /// Create a filter from configuration.
    #[must_use]
    pub const fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.rssi_threshold)
    }

    /// The floor in effect.
    #[must_use]
    pub const fn rssi_threshold(&self) -> i16 {
        self.rssi_threshold
    }

    /// Clamp, threshold, then resolve the name, in that order.
    #[must_use]
    pub fn evaluate(&self, sighting: RawSighting) -> FilterOutcome {
        let rssi = normalize_rssi(sighting.rssi);

        if rssi < self.rssi_threshold {
            return FilterOutcome::Rejected(Rejection::BelowThreshold {
                rssi,
                threshold: self.rssi_threshold,
            });
        }

        let Some(name) = sighting.name.or(sighting.local_name) else {
            return FilterOutcome::Rejected(Rejection::Unnamed);
        };

        FilterOutcome::Accepted(AcceptedSighting {
            id: sighting.id,
            name,
            rssi,
            seen_at: sighting.seen_at,
        })
    }
}

/// Clamp impossible positive readings to 0.
#[must_use]
pub const fn normalize_rssi(rssi: i16) -> i16 {
    if rssi > 0 {
        0
    } else {
        rssi
    }
}
