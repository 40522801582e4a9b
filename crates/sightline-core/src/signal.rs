//! Signal strength classification.
//!
//! Maps a received signal strength (dBm, more negative is weaker) onto one of
//! four display tiers. The bar count doubles as the primary key of the
//! signal-ranked view in [`crate::reconcile`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Signal strength tier derived from an RSSI reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    /// `-71` dBm and below.
    Weak,
    /// `-70..=-66` dBm.
    Fair,
    /// `-65..=-56` dBm.
    Good,
    /// `-55` dBm and above.
    Excellent,
}

/// Colour hint a presentation layer can use when rendering a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColorHint {
    /// Strong signal.
    Green,
    /// Usable but fading.
    Orange,
    /// Barely in range.
    Red,
}

impl SignalStrength {
    /// Classify an RSSI value in dBm.
    ///
    /// Total over all integers. Readings above 0 are physically impossible for
    /// a passive receiver but still classify as [`SignalStrength::Excellent`].
    #[must_use]
    pub const fn from_rssi(rssi: i16) -> Self {
        match rssi {
            -55..=i16::MAX => Self::Excellent,
            -65..=-56 => Self::Good,
            -70..=-66 => Self::Fair,
            _ => Self::Weak,
        }
    }

    /// Number of bars (2 to 5) to display for this tier.
    #[must_use]
    pub const fn bars(self) -> u8 {
        match self {
            Self::Excellent => 5,
            Self::Good => 4,
            Self::Fair => 3,
            Self::Weak => 2,
        }
    }

    /// Display colour for this tier.
    #[must_use]
    pub const fn color(self) -> ColorHint {
        match self {
            Self::Excellent | Self::Good => ColorHint::Green,
            Self::Fair => ColorHint::Orange,
            Self::Weak => ColorHint::Red,
        }
    }

    /// Lowercase tier name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Weak => "weak",
        }
    }
}

impl From<i16> for SignalStrength {
    fn from(rssi: i16) -> Self {
        Self::from_rssi(rssi)
    }
}

impl std::fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Shorthand for `SignalStrength::from_rssi(rssi).bars()`.
#[must_use]
pub const fn bars_for(rssi: i16) -> u8 {
    SignalStrength::from_rssi(rssi).bars()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(SignalStrength::from_rssi(0), SignalStrength::Excellent);
        assert_eq!(SignalStrength::from_rssi(-55), SignalStrength::Excellent);
        assert_eq!(SignalStrength::from_rssi(-56), SignalStrength::Good);
        assert_eq!(SignalStrength::from_rssi(-65), SignalStrength::Good);
        assert_eq!(SignalStrength::from_rssi(-66), SignalStrength::Fair);
        assert_eq!(SignalStrength::from_rssi(-70), SignalStrength::Fair);
        assert_eq!(SignalStrength::from_rssi(-71), SignalStrength::Weak);
        assert_eq!(SignalStrength::from_rssi(i16::MIN), SignalStrength::Weak);
    }

    #[test]
    fn test_positive_readings_are_excellent() {
        assert_eq!(SignalStrength::from_rssi(12), SignalStrength::Excellent);
        assert_eq!(SignalStrength::from_rssi(i16::MAX), SignalStrength::Excellent);
    }

    #[test]
    fn test_bars_range_and_monotonic() {
        let mut previous = bars_for(i16::MIN);
        for rssi in i16::MIN..=i16::MAX {
            let bars = bars_for(rssi);
            assert!((2..=5).contains(&bars), "bars {bars} out of range at {rssi}");
            assert!(bars >= previous, "bars decreased at {rssi}");
            previous = bars;
        }
    }

    #[test]
    fn test_color_hints() {
        assert_eq!(SignalStrength::Excellent.color(), ColorHint::Green);
        assert_eq!(SignalStrength::Good.color(), ColorHint::Green);
        assert_eq!(SignalStrength::Fair.color(), ColorHint::Orange);
        assert_eq!(SignalStrength::Weak.color(), ColorHint::Red);
    }

    #[test]
    fn test_tier_serializes_snake_case() {
        let json = serde_json::to_string(&SignalStrength::Excellent).unwrap();
        assert_eq!(json, "\"excellent\"");
        assert_eq!(SignalStrength::Fair.to_string(), "fair");
    }
}
