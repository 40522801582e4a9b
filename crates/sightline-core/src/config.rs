//! Engine configuration.
//!
//! Handles loading, saving and validating sightline configuration:
//! - Sighting filter floor
//! - Throttle window and stale timeout
//! - Scan policy (continuous with restarts, or duty-cycled bursts)
//! - Engine queue sizing and the server bind address
//!
//! Values come from an optional TOML file layered under `SIGHTLINE__*`
//! environment variables, e.g. `SIGHTLINE__FILTER__RSSI_THRESHOLD=-65`.
//! Durations are written as fractional seconds.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SIGHTLINE";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file or environment could not be parsed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// One or more values are out of range.
    #[error("invalid configuration: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A single invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SightlineConfig {
    /// Sighting admission.
    pub filter: FilterConfig,
    /// Throttling and eviction.
    pub tracking: TrackingConfig,
    /// Scan scheduling.
    pub scan: ScanConfig,
    /// Engine task sizing.
    pub engine: EngineConfig,
    /// HTTP surface.
    pub server: ServerConfig,
}

/// Sighting admission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Readings below this many dBm are dropped.
    pub rssi_threshold: i16,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { rssi_threshold: -70 }
    }
}

/// Throttling and eviction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Minimum spacing between accepted sightings of one device.
    #[serde(with = "duration_secs")]
    pub min_update_interval: Duration,

    /// Devices unseen for this long are evicted unless connected.
    #[serde(with = "duration_secs")]
    pub stale_timeout: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_update_interval: Duration::from_secs(1),
            stale_timeout: Duration::from_secs(6),
        }
    }
}

/// Scan scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanMode {
    /// Scan continuously, stopping and restarting periodically to shake
    /// radio stacks out of a state where they stop reporting advertisements.
    ContinuousWithRestart {
        /// Time between restarts.
        #[serde(with = "duration_secs")]
        restart_interval: Duration,
        /// Pause between stop and restart.
        #[serde(with = "duration_secs")]
        settle_delay: Duration,
    },
    /// Scan in fixed bursts separated by idle gaps.
    DutyCycled {
        /// Time between burst starts.
        #[serde(with = "duration_secs")]
        interval: Duration,
        /// Length of each burst.
        #[serde(with = "duration_secs")]
        burst: Duration,
    },
}

impl ScanMode {
    /// Continuous scanning with the stock 10s restart and 1s settle delay.
    #[must_use]
    pub const fn continuous() -> Self {
        Self::ContinuousWithRestart {
            restart_interval: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
        }
    }

    /// Duty cycling with the stock 2s burst every 5s.
    #[must_use]
    pub const fn duty_cycled() -> Self {
        Self::DutyCycled {
            interval: Duration::from_secs(5),
            burst: Duration::from_secs(2),
        }
    }

    /// Short name used in logs and status output.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ContinuousWithRestart { .. } => "continuous_with_restart",
            Self::DutyCycled { .. } => "duty_cycled",
        }
    }
}

impl Default for ScanMode {
    fn default() -> Self {
        Self::continuous()
    }
}

/// Scan scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Scan policy.
    pub mode: ScanMode,

    /// Time between eviction sweeps.
    #[serde(with = "duration_secs")]
    pub eviction_interval: Duration,

    /// Start scanning as soon as the adapter is powered on.
    pub auto_start: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::default(),
            eviction_interval: Duration::from_secs(5),
            auto_start: true,
        }
    }
}

/// Engine task settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the engine's event queue.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

impl SightlineConfig {
    /// Load configuration.
    ///
    /// With `Some(path)` the file must exist. With `None` the platform
    /// default location is used when present. Environment overrides are
    /// applied on top either way, and the result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or holds
    /// invalid values.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = ::config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                builder = builder.add_source(
                    ::config::File::from(path).format(::config::FileFormat::Toml),
                );
            }
            None => {
                if let Some(default_path) = default_config_path() {
                    builder = builder.add_source(
                        ::config::File::from(default_path)
                            .format(::config::FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        let config: Self = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Write configuration as pretty TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)?;
        Ok(())
    }

    /// Check every value, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] listing each invalid field.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut issues = Vec::new();
        let mut require = |ok: bool, field: &'static str, message: &str| {
            if !ok {
                issues.push(ValidationIssue {
                    field,
                    message: message.to_string(),
                });
            }
        };

        require(
            self.filter.rssi_threshold <= 0,
            "filter.rssi_threshold",
            "must be 0 dBm or lower",
        );
        require(
            !self.tracking.stale_timeout.is_zero(),
            "tracking.stale_timeout",
            "must be greater than zero",
        );
        require(
            !self.scan.eviction_interval.is_zero(),
            "scan.eviction_interval",
            "must be greater than zero",
        );
        require(
            self.engine.queue_capacity > 0,
            "engine.queue_capacity",
            "must be greater than zero",
        );
        require(
            !self.server.bind_address.trim().is_empty(),
            "server.bind_address",
            "must not be empty",
        );

        match self.scan.mode {
            ScanMode::ContinuousWithRestart {
                restart_interval,
                settle_delay,
            } => {
                require(
                    !restart_interval.is_zero(),
                    "scan.mode.restart_interval",
                    "must be greater than zero",
                );
                require(
                    settle_delay < restart_interval,
                    "scan.mode.settle_delay",
                    "must be shorter than restart_interval",
                );
            }
            ScanMode::DutyCycled { interval, burst } => {
                require(
                    !burst.is_zero(),
                    "scan.mode.burst",
                    "must be greater than zero",
                );
                require(
                    burst < interval,
                    "scan.mode.burst",
                    "must be shorter than interval",
                );
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(issues))
        }
    }
}

/// Platform default configuration path.
///
/// On Linux: `/etc/sightline/config.toml`.
/// Elsewhere: the user configuration directory.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Some(PathBuf::from("/etc/sightline/config.toml"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "sightline")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tracking_policy() {
        let config = SightlineConfig::default();
        assert_eq!(config.filter.rssi_threshold, -70);
        assert_eq!(config.tracking.min_update_interval, Duration::from_secs(1));
        assert_eq!(config.tracking.stale_timeout, Duration::from_secs(6));
        assert_eq!(config.scan.eviction_interval, Duration::from_secs(5));
        assert_eq!(config.scan.mode, ScanMode::continuous());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip_with_fractional_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = SightlineConfig::default();
        config.tracking.min_update_interval = Duration::from_millis(1500);
        config.scan.mode = ScanMode::duty_cycled();
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("min_update_interval = 1.5"));
        assert!(content.contains("kind = \"duty_cycled\""));

        let loaded = SightlineConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[filter]\nrssi_threshold = -80\n").unwrap();

        let loaded = SightlineConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.filter.rssi_threshold, -80);
        assert_eq!(loaded.tracking, TrackingConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_not_found() {
        let err = SightlineConfig::load(Some(Path::new("/nonexistent/sightline.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_validation_collects_every_issue() {
        let mut config = SightlineConfig::default();
        config.filter.rssi_threshold = 5;
        config.engine.queue_capacity = 0;
        config.scan.mode = ScanMode::DutyCycled {
            interval: Duration::from_secs(2),
            burst: Duration::from_secs(3),
        };

        let Err(ConfigError::Validation(issues)) = config.validate() else {
            panic!("expected validation failure");
        };
        let fields: Vec<&str> = issues.iter().map(|i| i.field).collect();
        assert_eq!(
            fields,
            vec!["filter.rssi_threshold", "engine.queue_capacity", "scan.mode.burst"]
        );
    }

    #[test]
    fn test_settle_delay_must_fit_in_restart_interval() {
        let mut config = SightlineConfig::default();
        config.scan.mode = ScanMode::ContinuousWithRestart {
            restart_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(1),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[filter\nrssi_threshold = ").unwrap();

        let err = SightlineConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_converts_into_unified_error() {
        let err: crate::SightlineError =
            ConfigError::Validation(vec![ValidationIssue {
                field: "filter.rssi_threshold",
                message: "must be 0 dBm or lower".into(),
            }])
            .into();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("filter.rssi_threshold"));
    }
}
