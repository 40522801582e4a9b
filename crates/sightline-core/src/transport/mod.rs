//! The advertisement source the engine drives.
//!
//! A [`Transport`] owns the radio. The engine calls into it to start and stop
//! scanning and to forward connection requests; the transport reports back
//! through an [`EventSink`](crate::engine::EventSink): sightings, adapter power
//! changes and connection state changes.
//!
//! Backends:
//! - [`mock::MockTransport`] - records calls, emits nothing (tests)
//! - [`simulated::SimulatedTransport`] - synthesises noisy advertisers (demos)
//! - `bluez::BluezTransport` - BlueZ via `bluer` (Linux, `bluetooth` feature)

#[cfg(feature = "bluetooth")]
pub mod bluez;
pub mod mock;
pub mod simulated;

use crate::types::DeviceId;

/// Radio collaborator consumed by the engine.
///
/// Every method must return promptly: they are called from the engine task
/// and anything slow belongs in a task the transport spawns itself. Calls
/// made while the adapter is not ready are silently ignored.
pub trait Transport: Send + Sync + 'static {
    /// Short backend name for logs and status output.
    fn name(&self) -> &'static str;

    /// Whether the adapter is currently powered on.
    fn is_powered_on(&self) -> bool;

    /// Start reporting advertisements. No-op if not ready or already scanning.
    fn begin_scan(&self);

    /// Stop reporting advertisements. Idempotent.
    fn stop_scan(&self);

    /// Ask the radio to connect to `id`.
    fn connect(&self, id: &DeviceId);

    /// Ask the radio to drop or cancel the connection to `id`.
    fn disconnect(&self, id: &DeviceId);
}
