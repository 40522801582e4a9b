//! Synthetic advertisers for demos and local development.
//!
//! Emits a fixed catalogue of devices on a short advertising period with
//! deterministic signal jitter. The catalogue deliberately includes devices
//! the engine should ignore (one unnamed, one too far away) and one that
//! drops in and out of range long enough to be evicted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Transport;
use crate::engine::EventSink;
use crate::filter::RawSighting;
use crate::types::{ConnectionState, DeviceId};

const ADVERTISING_PERIOD: Duration = Duration::from_millis(250);
const CONNECT_LATENCY: Duration = Duration::from_millis(600);
const DISCONNECT_LATENCY: Duration = Duration::from_millis(200);

/// When a simulated device is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Advertises on every round.
    Always,
    /// Alternates between `visible` rounds in range and `hidden` rounds out.
    Intermittent {
        /// Rounds in range.
        visible: u64,
        /// Rounds out of range.
        hidden: u64,
    },
}

impl Presence {
    const fn is_visible(self, round: u64) -> bool {
        match self {
            Self::Always => true,
            Self::Intermittent { visible, hidden } => {
                let period = visible + hidden;
                period == 0 || round % period < visible
            }
        }
    }
}

/// One synthetic advertiser.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    /// Random per-run identifier.
    pub id: DeviceId,
    /// Advertised name, if any.
    pub name: Option<String>,
    /// Centre of the reported signal.
    pub base_rssi: i16,
    /// Whether connection attempts succeed.
    pub connectable: bool,
    /// When the device is in range.
    pub presence: Presence,
}

impl SimulatedDevice {
    /// A named, connectable device that is always in range.
    #[must_use]
    pub fn new(name: Option<&str>, base_rssi: i16) -> Self {
        Self {
            id: DeviceId::new(Uuid::new_v4().to_string()),
            name: name.map(str::to_string),
            base_rssi,
            connectable: true,
            presence: Presence::Always,
        }
    }

    /// Mark the device as refusing connections.
    #[must_use]
    pub const fn refusing_connections(mut self) -> Self {
        self.connectable = false;
        self
    }

    /// Set when the device is in range.
    #[must_use]
    pub const fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    fn reading(&self, round: u64, index: usize) -> i16 {
        self.base_rssi.saturating_add(jitter(round, index))
    }
}

/// The stock catalogue.
#[must_use]
pub fn default_catalogue() -> Vec<SimulatedDevice> {
    vec![
        SimulatedDevice::new(Some("Heart Rate Strap"), -48),
        SimulatedDevice::new(Some("Kitchen Thermometer"), -62),
        SimulatedDevice::new(Some("Desk Lamp"), -67).refusing_connections(),
        SimulatedDevice::new(Some("Bike Computer"), -58).with_presence(Presence::Intermittent {
            visible: 40,
            hidden: 40,
        }),
        SimulatedDevice::new(None, -45),
        SimulatedDevice::new(Some("Neighbour's Speaker"), -88),
    ]
}

/// Deterministic noise in `-4..=4`.
fn jitter(round: u64, index: usize) -> i16 {
    let seed = round
        .wrapping_mul(2_654_435_761)
        .wrapping_add(index as u64 * 40_503);
    i16::try_from(seed % 9).unwrap_or(0) - 4
}

/// Transport that fabricates advertisements.
pub struct SimulatedTransport {
    sink: EventSink,
    devices: Vec<SimulatedDevice>,
    powered: AtomicBool,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SimulatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedTransport")
            .field("devices", &self.devices.len())
            .field("powered", &self.is_powered_on())
            .field("scanning", &self.is_scanning())
            .finish()
    }
}

impl SimulatedTransport {
    /// Powered-on transport with the stock catalogue.
    #[must_use]
    pub fn new(sink: EventSink) -> Self {
        Self::with_devices(sink, default_catalogue())
    }

    /// Powered-on transport with a custom catalogue.
    #[must_use]
    pub fn with_devices(sink: EventSink, devices: Vec<SimulatedDevice>) -> Self {
        Self {
            sink,
            devices,
            powered: AtomicBool::new(true),
            scan_task: Mutex::new(None),
        }
    }

    /// The catalogue in use.
    #[must_use]
    pub fn devices(&self) -> &[SimulatedDevice] {
        &self.devices
    }

    /// Whether advertisements are currently being emitted.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scan_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Flip the virtual adapter and notify the engine.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SightlineError::EngineUnavailable`] if the engine has stopped.
    pub async fn set_powered(&self, powered: bool) -> crate::Result<()> {
        if self.powered.swap(powered, Ordering::SeqCst) == powered {
            return Ok(());
        }
        info!(powered, "Simulated adapter power changed");
        if !powered {
            self.stop_scan();
        }
        self.sink.adapter_state_changed(powered).await
    }

    fn find(&self, id: &DeviceId) -> Option<&SimulatedDevice> {
        self.devices.iter().find(|d| &d.id == id)
    }
}

impl Transport for SimulatedTransport {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn is_powered_on(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn begin_scan(&self) {
        if !self.is_powered_on() {
            return;
        }
        let mut slot = self.scan_task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let sink = self.sink.clone();
        let devices = self.devices.clone();
        debug!(devices = devices.len(), "Simulated scan started");

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ADVERTISING_PERIOD);
            let mut round: u64 = 0;
            loop {
                ticker.tick().await;
                for (index, device) in devices.iter().enumerate() {
                    if !device.presence.is_visible(round) {
                        continue;
                    }
                    let sighting = RawSighting::now(
                        device.id.clone(),
                        device.name.clone(),
                        device.reading(round, index),
                    );
                    if sink.sighting(sighting).await.is_err() {
                        warn!("Engine inbox closed, ending simulated scan");
                        return;
                    }
                }
                round += 1;
            }
        }));
    }

    fn stop_scan(&self) {
        if let Some(task) = self
            .scan_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
            debug!("Simulated scan stopped");
        }
    }

    fn connect(&self, id: &DeviceId) {
        if !self.is_powered_on() {
            return;
        }
        let sink = self.sink.clone();
        let id = id.clone();
        let connectable = self.find(&id).map(|d| d.connectable);

        tokio::spawn(async move {
            if sink
                .connection_state_changed(id.clone(), ConnectionState::Connecting)
                .await
                .is_err()
            {
                return;
            }
            tokio::time::sleep(CONNECT_LATENCY).await;

            let result = match connectable {
                Some(true) => {
                    sink.connection_state_changed(id, ConnectionState::Connected)
                        .await
                }
                Some(false) => fail(&sink, id, "connection refused by peer").await,
                None => fail(&sink, id, "device not reachable").await,
            };
            if result.is_err() {
                debug!("Engine gone before simulated connect completed");
            }
        });
    }

    fn disconnect(&self, id: &DeviceId) {
        if !self.is_powered_on() {
            return;
        }
        let sink = self.sink.clone();
        let id = id.clone();

        tokio::spawn(async move {
            if sink
                .connection_state_changed(id.clone(), ConnectionState::Disconnecting)
                .await
                .is_err()
            {
                return;
            }
            tokio::time::sleep(DISCONNECT_LATENCY).await;
            let _ = sink
                .connection_state_changed(id, ConnectionState::NotConnected)
                .await;
        });
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.stop_scan();
    }
}

async fn fail(sink: &EventSink, id: DeviceId, reason: &str) -> crate::Result<()> {
    sink.connection_failed(id.clone(), reason).await?;
    sink.connection_state_changed(id, ConnectionState::NotConnected)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineEvent, EngineInbox};
    use crate::types::ConnectionFailure;

    fn drain(inbox: &mut EngineInbox) -> Vec<EngineEvent> {
        std::iter::from_fn(|| inbox.try_recv()).collect()
    }

    fn sightings(events: &[EngineEvent]) -> Vec<&RawSighting> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Sighting(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_jitter_stays_in_range() {
        for round in 0..500 {
            for index in 0..8 {
                assert!((-4..=4).contains(&jitter(round, index)));
            }
        }
    }

    #[test]
    fn test_intermittent_presence_alternates() {
        let presence = Presence::Intermittent {
            visible: 2,
            hidden: 3,
        };
        let pattern: Vec<bool> = (0..6).map(|r| presence.is_visible(r)).collect();
        assert_eq!(pattern, vec![true, true, false, false, false, true]);
        assert!(Presence::Always.is_visible(u64::MAX));
    }

    #[test]
    fn test_default_catalogue_ids_are_unique() {
        let catalogue = default_catalogue();
        let mut ids: Vec<_> = catalogue.iter().map(|d| d.id.clone()).collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids.dedup();
        assert_eq!(ids.len(), catalogue.len());
        assert!(catalogue.iter().any(|d| d.name.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_emits_every_visible_device() {
        let (sink, mut inbox) = EventSink::channel(256);
        let transport = SimulatedTransport::new(sink);

        transport.begin_scan();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let events = drain(&mut inbox);
        assert_eq!(sightings(&events).len(), transport.devices().len());
        assert!(transport.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_scan_halts_sightings() {
        let (sink, mut inbox) = EventSink::channel(256);
        let transport =
            SimulatedTransport::with_devices(sink, vec![SimulatedDevice::new(Some("A"), -50)]);

        transport.begin_scan();
        tokio::time::sleep(Duration::from_millis(10)).await;
        transport.stop_scan();
        drain(&mut inbox);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(drain(&mut inbox).is_empty());
        assert!(!transport.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpowered_transport_ignores_scan() {
        let (sink, mut inbox) = EventSink::channel(16);
        let transport = SimulatedTransport::new(sink);

        transport.set_powered(false).await.unwrap();
        transport.begin_scan();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let events = drain(&mut inbox);
        assert!(matches!(
            events.as_slice(),
            [EngineEvent::AdapterStateChanged { powered_on: false }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_reports_transitions() {
        let (sink, mut inbox) = EventSink::channel(16);
        let device = SimulatedDevice::new(Some("A"), -50);
        let id = device.id.clone();
        let transport = SimulatedTransport::with_devices(sink, vec![device]);

        transport.connect(&id);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let states: Vec<ConnectionState> = drain(&mut inbox)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::ConnectionStateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connection_reports_failure() {
        let (sink, mut inbox) = EventSink::channel(16);
        let device = SimulatedDevice::new(Some("Lamp"), -50).refusing_connections();
        let id = device.id.clone();
        let transport = SimulatedTransport::with_devices(sink, vec![device]);

        transport.connect(&id);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let events = drain(&mut inbox);
        let failure: Vec<&ConnectionFailure> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::ConnectionFailed(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(failure.len(), 1);
        assert_eq!(failure[0].id, id);
        assert!(matches!(
            events.last(),
            Some(EngineEvent::ConnectionStateChanged {
                state: ConnectionState::NotConnected,
                ..
            })
        ));
    }
}
