//! # sightline-core
//!
//! Discovery-tracking engine for the sightline BLE scanner.
//!
//! The engine consumes a noisy stream of advertisements and maintains a
//! stable, throttled, time-bounded set of nearby devices that a
//! presentation layer can render without flicker.
//!
//! ## Architecture
//!
//! - [`signal`] - RSSI to signal tier and bar count
//! - [`filter`] - admission rules for raw sightings
//! - [`store`] - the device table: smoothing, throttling, eviction
//! - [`reconcile`] - stable display order and signal ranking
//! - [`scheduler`] - scan lifecycle and timers
//! - [`engine`] - the task tying it all together, plus its handle
//! - [`transport`] - radio backends the engine drives
//! - [`config`] - configuration loading, saving, and validation
//! - [`error`] - unified error types for the crate
//! - [`types`] - shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod reconcile;
pub mod scheduler;
pub mod signal;
pub mod store;
pub mod transport;
pub mod types;

// Re-export primary types for convenience
pub use config::{
    ConfigError, ConfigResult, EngineConfig, FilterConfig, ScanConfig, ScanMode, ServerConfig,
    SightlineConfig, TrackingConfig,
};
pub use engine::{ConnectOutcome, DiscoveryEngine, EngineHandle, EngineStatus, EventSink};
pub use error::{Result, SightlineError};
pub use filter::{RawSighting, SightingFilter};
pub use reconcile::ViewOrder;
pub use scheduler::SchedulerState;
pub use signal::{ColorHint, SignalStrength};
pub use store::{DeviceSnapshot, DeviceStore, TrackedDevice};
pub use transport::Transport;
pub use types::{ConnectionFailure, ConnectionState, DeviceId, DeviceList, DeviceView};
