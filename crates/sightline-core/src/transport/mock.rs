//! Call-recording transport for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use super::Transport;
use crate::types::DeviceId;

/// A call the engine made into the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// [`Transport::begin_scan`].
    BeginScan,
    /// [`Transport::stop_scan`].
    StopScan,
    /// [`Transport::connect`].
    Connect(DeviceId),
    /// [`Transport::disconnect`].
    Disconnect(DeviceId),
}

/// Transport that records every call and never emits events on its own.
#[derive(Debug)]
pub struct MockTransport {
    powered: AtomicBool,
    scanning: AtomicBool,
    calls: Mutex<Vec<TransportCall>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::powered()
    }
}

impl MockTransport {
    /// A transport whose adapter is powered on.
    #[must_use]
    pub fn powered() -> Self {
        Self::with_power(true)
    }

    /// A transport whose adapter is powered off.
    #[must_use]
    pub fn unpowered() -> Self {
        Self::with_power(false)
    }

    fn with_power(powered: bool) -> Self {
        Self {
            powered: AtomicBool::new(powered),
            scanning: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Flip the adapter power flag. Powering off also ends any scan.
    pub fn set_powered(&self, powered: bool) {
        self.powered.store(powered, Ordering::SeqCst);
        if !powered {
            self.scanning.store(false, Ordering::SeqCst);
        }
    }

    /// Whether a scan is in progress.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times `call` was made.
    pub fn count(&self, call: &TransportCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, call: TransportCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_powered_on(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn begin_scan(&self) {
        self.record(TransportCall::BeginScan);
        if self.is_powered_on() {
            self.scanning.store(true, Ordering::SeqCst);
        }
    }

    fn stop_scan(&self) {
        self.record(TransportCall::StopScan);
        self.scanning.store(false, Ordering::SeqCst);
    }

    fn connect(&self, id: &DeviceId) {
        self.record(TransportCall::Connect(id.clone()));
    }

    fn disconnect(&self, id: &DeviceId) {
        self.record(TransportCall::Disconnect(id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_scan_is_ignored_while_unpowered() {
        let transport = MockTransport::unpowered();
        transport.begin_scan();
        assert!(!transport.is_scanning());
        assert_eq!(transport.count(&TransportCall::BeginScan), 1);
    }

    #[test]
    fn test_power_off_ends_scan() {
        let transport = MockTransport::powered();
        transport.begin_scan();
        assert!(transport.is_scanning());

        transport.set_powered(false);
        assert!(!transport.is_scanning());
    }
}
