//! Unified error types for the sightline core library.
//!
//! The tracking pipeline itself never fails: malformed sightings are dropped,
//! impossible readings are clamped and operations on unknown devices are
//! no-ops. [`SightlineError`] covers what is left, namely configuration
//! loading, transport construction and talking to an engine that has shut
//! down.
//!
//! # Example
//!
//! ```rust
//! use sightline_core::error::{Result, SightlineError};
//! use std::path::PathBuf;
//!
//! fn require_config(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(SightlineError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all sightline operations.
#[derive(Debug, Error)]
pub enum SightlineError {
    // =========================================================================
    // TRANSPORT ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    AdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    AdapterPoweredOff,

    /// The advertisement transport failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The device is not present in the tracked table.
    #[error("Device not found: '{0}'. It may have gone out of range and been evicted.")]
    DeviceNotFound(String),

    // =========================================================================
    // ENGINE ERRORS
    // =========================================================================
    /// The engine task has stopped and no longer accepts requests.
    #[error("Discovery engine is not running")]
    EngineUnavailable,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for sightline operations.
pub type Result<T> = std::result::Result<T, SightlineError>;

impl SightlineError {
    /// Returns `true` if this error came from the advertisement transport.
    #[inline]
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::AdapterNotFound
                | Self::AdapterPoweredOff
                | Self::Transport(_)
                | Self::DeviceNotFound(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is likely to clear up without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound(_) | Self::Transport(_) | Self::AdapterPoweredOff
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::ConfigNotFound(_) | Self::DeviceNotFound(_) => 404,
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,
            Self::IoError(_) => 500,
            Self::AdapterNotFound
            | Self::AdapterPoweredOff
            | Self::Transport(_)
            | Self::EngineUnavailable => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AdapterNotFound => "ADAPTER_NOT_FOUND",
            Self::AdapterPoweredOff => "ADAPTER_POWERED_OFF",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::EngineUnavailable => "ENGINE_UNAVAILABLE",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for SightlineError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Serialize(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Write { path, source } => Self::IoError(std::io::Error::new(
                source.kind(),
                format!("Failed to write {}: {source}", path.display()),
            )),
            ConfigError::Validation(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SightlineError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::EngineUnavailable
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for SightlineError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::EngineUnavailable
    }
}
