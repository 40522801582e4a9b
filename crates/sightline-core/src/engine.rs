//! The discovery engine.
//!
//! [`DiscoveryEngine`] owns the filter, the device table, the display order
//! and the scan scheduler, and runs as a single Tokio task. Everything that
//! can change state arrives on one of two queues and is applied to completion
//! before the next one is looked at. Sightings, adapter power changes and
//! timer ticks come through the [`EventSink`] queue. Requests come through a
//! command queue that only [`EngineHandle`]s hold, so the task ends once the
//! last handle is dropped. Readers only ever see fully applied states,
//! published through a `watch` channel.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sightline_core::engine::DiscoveryEngine;
//! use sightline_core::transport::simulated::SimulatedTransport;
//! use sightline_core::SightlineConfig;
//!
//! # async fn run() -> sightline_core::Result<()> {
//! let handle = DiscoveryEngine::spawn_with(SightlineConfig::default(), |sink| {
//!     Arc::new(SimulatedTransport::new(sink))
//! });
//! handle.start().await?;
//! let mut updates = handle.subscribe();
//! updates.changed().await.ok();
//! println!("{} devices visible", updates.borrow().len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace};
use utoipa::ToSchema;

use crate::config::SightlineConfig;
use crate::error::{Result, SightlineError};
use crate::filter::{FilterOutcome, RawSighting, SightingFilter};
use crate::reconcile::{ViewOrder, ViewReconciler};
use crate::scheduler::{ScanScheduler, SchedulerState, TickOutcome, TimerTick};
use crate::store::{DeviceSnapshot, DeviceStore, RecordOutcome};
use crate::transport::Transport;
use crate::types::{ConnectionFailure, ConnectionState, DeviceId, DeviceList, DeviceView};

const FAILURE_CHANNEL_CAPACITY: usize = 32;

/// Everything the engine task reacts to.
#[derive(Debug)]
pub(crate) enum EngineEvent {
    Sighting(RawSighting),
    AdapterStateChanged { powered_on: bool },
    ConnectionStateChanged { id: DeviceId, state: ConnectionState },
    ConnectionFailed(ConnectionFailure),
    Timer(TimerTick),
}

#[derive(Debug)]
pub(crate) enum Command {
    Start(oneshot::Sender<EngineStatus>),
    Stop(oneshot::Sender<EngineStatus>),
    Connect(DeviceId, oneshot::Sender<ConnectOutcome>),
    Disconnect(DeviceId, oneshot::Sender<ConnectOutcome>),
    View(ViewOrder, oneshot::Sender<Vec<DeviceView>>),
    Snapshot(oneshot::Sender<DeviceSnapshot>),
    Status(oneshot::Sender<EngineStatus>),
    Shutdown,
}

/// Sending half of the engine queue, handed to transports and timers.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<EngineEvent>,
}

/// Receiving half of the engine queue.
#[derive(Debug)]
pub struct EngineInbox {
    rx: mpsc::Receiver<EngineEvent>,
}

impl EngineInbox {
    async fn recv(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }
}

impl EventSink {
    /// Create a bounded engine queue.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, EngineInbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, EngineInbox { rx })
    }

    /// Report an advertisement.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] once the engine has stopped.
    pub async fn sighting(&self, sighting: RawSighting) -> Result<()> {
        self.send(EngineEvent::Sighting(sighting)).await
    }

    /// Report an advertisement without waiting for queue space.
    ///
    /// Returns `false` if the sighting was dropped because the queue is full
    /// or the engine has stopped. For callbacks that cannot await.
    pub fn try_sighting(&self, sighting: RawSighting) -> bool {
        self.tx.try_send(EngineEvent::Sighting(sighting)).is_ok()
    }

    /// Report that the adapter was powered on or off.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] once the engine has stopped.
    pub async fn adapter_state_changed(&self, powered_on: bool) -> Result<()> {
        self.send(EngineEvent::AdapterStateChanged { powered_on })
            .await
    }

    /// Report a connection state change for a device.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] once the engine has stopped.
    pub async fn connection_state_changed(&self, id: DeviceId, state: ConnectionState) -> Result<()> {
        self.send(EngineEvent::ConnectionStateChanged { id, state })
            .await
    }

    /// Report a failed connection attempt. Passed to subscribers as-is.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] once the engine has stopped.
    pub async fn connection_failed(&self, id: DeviceId, reason: impl Into<String>) -> Result<()> {
        self.send(EngineEvent::ConnectionFailed(ConnectionFailure {
            id,
            reason: reason.into(),
        }))
        .await
    }

    pub(crate) async fn tick(&self, tick: TimerTick) -> Result<()> {
        self.send(EngineEvent::Timer(tick)).await
    }

    async fn send(&self, event: EngineEvent) -> Result<()> {
        Ok(self.tx.send(event).await?)
    }
}

/// Result of a connect or disconnect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConnectOutcome {
    /// Forwarded to the transport.
    Requested,
    /// The id is not in the table.
    UnknownDevice,
    /// The adapter is not powered on.
    AdapterUnavailable,
    /// Connect: the device already holds the connection slot.
    AlreadyConnected,
    /// Disconnect: the device is not connected.
    NotConnected,
    /// Connect: another device holds the connection slot.
    Busy {
        /// Device holding the slot.
        active: DeviceId,
    },
}

impl ConnectOutcome {
    /// Machine-readable outcome name, matching the serialized tag.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::UnknownDevice => "unknown_device",
            Self::AdapterUnavailable => "adapter_unavailable",
            Self::AlreadyConnected => "already_connected",
            Self::NotConnected => "not_connected",
            Self::Busy { .. } => "busy",
        }
    }
}

/// Point-in-time engine status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EngineStatus {
    /// Scheduler state.
    pub state: SchedulerState,
    /// Scan policy name.
    #[schema(example = "continuous_with_restart")]
    pub mode: String,
    /// Transport backend name.
    #[schema(example = "simulated")]
    pub transport: String,
    /// Whether the adapter is powered on.
    pub adapter_powered: bool,
    /// Whether scanning was requested (and will resume on power-on).
    pub scan_requested: bool,
    /// Number of tracked devices.
    pub device_count: usize,
    /// Generation of the last published list.
    pub generation: u64,
}

/// The engine task state.
pub struct DiscoveryEngine {
    config: SightlineConfig,
    filter: SightingFilter,
    store: DeviceStore,
    reconciler: ViewReconciler,
    scheduler: ScanScheduler,
    transport: Arc<dyn Transport>,
    adapter_powered: bool,
    scan_requested: bool,
    generation: u64,
    list_tx: watch::Sender<DeviceList>,
    failures_tx: broadcast::Sender<ConnectionFailure>,
}

impl DiscoveryEngine {
    /// Spawn an engine whose transport is built from its own event sink.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_with<F>(config: SightlineConfig, make_transport: F) -> EngineHandle
    where
        F: FnOnce(EventSink) -> Arc<dyn Transport>,
    {
        let (sink, inbox) = EventSink::channel(config.engine.queue_capacity);
        let transport = make_transport(sink.clone());
        Self::spawn(config, transport, sink, inbox)
    }

    /// Spawn the engine task over an existing queue.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        config: SightlineConfig,
        transport: Arc<dyn Transport>,
        sink: EventSink,
        inbox: EngineInbox,
    ) -> EngineHandle {
        let (commands_tx, commands_rx) = mpsc::channel(config.engine.queue_capacity.max(1));
        let (list_tx, list_rx) = watch::channel(DeviceList::default());
        let (failures_tx, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);

        let engine = Self {
            filter: SightingFilter::from_config(&config.filter),
            store: DeviceStore::new(&config.tracking),
            reconciler: ViewReconciler::new(),
            scheduler: ScanScheduler::new(&config.scan, Arc::clone(&transport), sink.clone()),
            adapter_powered: transport.is_powered_on(),
            scan_requested: config.scan.auto_start,
            transport,
            generation: 0,
            list_tx,
            failures_tx: failures_tx.clone(),
            config,
        };

        let task = tokio::spawn(engine.run(inbox, commands_rx));

        EngineHandle {
            sink,
            commands: commands_tx,
            list_rx,
            failures_tx,
            task: Arc::new(task),
        }
    }

    async fn run(mut self, mut inbox: EngineInbox, mut commands: mpsc::Receiver<Command>) {
        info!(
            transport = self.transport.name(),
            mode = self.config.scan.mode.name(),
            powered = self.adapter_powered,
            "Discovery engine running"
        );

        if self.scan_requested && self.adapter_powered {
            self.scheduler.start();
        }

        // Events queued before a request are applied before it is answered.
        loop {
            tokio::select! {
                biased;
                Some(event) = inbox.recv() => self.handle(event),
                command = commands.recv() => match command {
                    Some(Command::Shutdown) => break,
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("All engine handles dropped");
                        break;
                    }
                },
            }
        }

        self.scheduler.stop();
        info!("Discovery engine stopped");
    }

    fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Sighting(sighting) => self.on_sighting(sighting),
            EngineEvent::AdapterStateChanged { powered_on } => self.on_adapter_state(powered_on),
            EngineEvent::ConnectionStateChanged { id, state } => {
                if self.store.set_connection_state(&id, state) {
                    debug!(device = %id, ?state, "Connection state changed");
                    self.publish();
                } else {
                    trace!(device = %id, ?state, "Connection state for untracked device ignored");
                }
            }
            EngineEvent::ConnectionFailed(failure) => {
                debug!(device = %failure.id, reason = %failure.reason, "Connection failed");
                let _ = self.failures_tx.send(failure);
            }
            EngineEvent::Timer(tick) => self.on_tick(tick),
        }
    }

    fn on_sighting(&mut self, sighting: RawSighting) {
        if self.scheduler.state() == SchedulerState::Idle {
            trace!(device = %sighting.id, "Sighting while idle dropped");
            return;
        }

        let accepted = match self.filter.evaluate(sighting) {
            FilterOutcome::Accepted(accepted) => accepted,
            FilterOutcome::Rejected(reason) => {
                debug!(?reason, "Sighting rejected");
                return;
            }
        };

        let id = accepted.id.clone();
        match self.store.record_sighting(accepted) {
            RecordOutcome::Throttled => debug!(device = %id, "Sighting throttled"),
            outcome => {
                debug!(device = %id, ?outcome, "Sighting recorded");
                self.publish();
            }
        }
    }

    fn on_adapter_state(&mut self, powered_on: bool) {
        if powered_on == self.adapter_powered {
            return;
        }
        self.adapter_powered = powered_on;

        if powered_on {
            info!("Adapter powered on");
            if self.scan_requested {
                self.scheduler.start();
            }
        } else {
            info!(devices = self.store.len(), "Adapter powered off, clearing devices");
            self.scheduler.force_idle();
            self.store.reset();
            self.reconciler.clear();
            self.publish();
        }
    }

    fn on_tick(&mut self, tick: TimerTick) {
        if self.scheduler.handle_tick(tick) == TickOutcome::EvictionDue {
            let evicted = self
                .store
                .evict_stale(Instant::now(), self.config.tracking.stale_timeout);
            if !evicted.is_empty() {
                debug!(count = evicted.len(), ?evicted, "Evicted stale devices");
            }
            self.publish();
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                self.scan_requested = true;
                if self.adapter_powered {
                    self.scheduler.start();
                } else {
                    info!("Adapter not powered, scanning will start once it is");
                }
                let _ = reply.send(self.status());
            }
            Command::Stop(reply) => {
                self.scan_requested = false;
                self.scheduler.stop();
                let _ = reply.send(self.status());
            }
            Command::Connect(id, reply) => {
                let _ = reply.send(self.connect(&id));
            }
            Command::Disconnect(id, reply) => {
                let _ = reply.send(self.disconnect(&id));
            }
            Command::View(order, reply) => {
                let _ = reply.send(self.reconciler.view(&self.store.snapshot(), order));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.store.snapshot());
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown => {}
        }
    }

    fn connect(&self, id: &DeviceId) -> ConnectOutcome {
        let Some(device) = self.store.get(id) else {
            return ConnectOutcome::UnknownDevice;
        };
        if !self.adapter_powered {
            return ConnectOutcome::AdapterUnavailable;
        }
        if device.connection_state.is_active() {
            return ConnectOutcome::AlreadyConnected;
        }
        if let Some(active) = self.store.active_connection() {
            return ConnectOutcome::Busy {
                active: active.id.clone(),
            };
        }
        info!(device = %id, "Connecting");
        self.transport.connect(id);
        ConnectOutcome::Requested
    }

    fn disconnect(&self, id: &DeviceId) -> ConnectOutcome {
        let Some(device) = self.store.get(id) else {
            return ConnectOutcome::UnknownDevice;
        };
        if !self.adapter_powered {
            return ConnectOutcome::AdapterUnavailable;
        }
        if device.connection_state == ConnectionState::NotConnected {
            return ConnectOutcome::NotConnected;
        }
        info!(device = %id, "Disconnecting");
        self.transport.disconnect(id);
        ConnectOutcome::Requested
    }

    fn publish(&mut self) {
        let snapshot = self.store.snapshot();
        let devices = self.reconciler.refresh(&snapshot);
        self.generation += 1;
        self.list_tx.send_replace(DeviceList {
            generation: self.generation,
            published_at_utc: Utc::now(),
            devices,
        });
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.scheduler.state(),
            mode: self.config.scan.mode.name().to_string(),
            transport: self.transport.name().to_string(),
            adapter_powered: self.adapter_powered,
            scan_requested: self.scan_requested,
            device_count: self.store.len(),
            generation: self.generation,
        }
    }
}

/// Cloneable handle to a running engine.
///
/// The engine task stops once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sink: EventSink,
    commands: mpsc::Sender<Command>,
    list_rx: watch::Receiver<DeviceList>,
    failures_tx: broadcast::Sender<ConnectionFailure>,
    task: Arc<tokio::task::JoinHandle<()>>,
}

impl EngineHandle {
    /// Request scanning. Starts immediately if the adapter is powered,
    /// otherwise once it powers on.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] if the engine has stopped.
    pub async fn start(&self) -> Result<EngineStatus> {
        self.request(Command::Start).await
    }

    /// Stop scanning and cancel all timers.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] if the engine has stopped.
    pub async fn stop(&self) -> Result<EngineStatus> {
        self.request(Command::Stop).await
    }

    /// Ask the transport to connect to a tracked device.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] if the engine has stopped.
    pub async fn connect(&self, id: DeviceId) -> Result<ConnectOutcome> {
        self.request(|reply| Command::Connect(id, reply)).await
    }

    /// Ask the transport to disconnect from a tracked device.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] if the engine has stopped.
    pub async fn disconnect(&self, id: DeviceId) -> Result<ConnectOutcome> {
        self.request(|reply| Command::Disconnect(id, reply)).await
    }

    /// Current devices in the requested order.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] if the engine has stopped.
    pub async fn view(&self, order: ViewOrder) -> Result<Vec<DeviceView>> {
        self.request(|reply| Command::View(order, reply)).await
    }

    /// Immutable copy of the device table.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] if the engine has stopped.
    pub async fn snapshot(&self) -> Result<DeviceSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Engine status.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] if the engine has stopped.
    pub async fn status(&self) -> Result<EngineStatus> {
        self.request(Command::Status).await
    }

    /// The most recently published list.
    #[must_use]
    pub fn current(&self) -> DeviceList {
        self.list_rx.borrow().clone()
    }

    /// Subscribe to list updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DeviceList> {
        self.list_rx.clone()
    }

    /// Subscribe to connection failure notifications.
    #[must_use]
    pub fn connection_failures(&self) -> broadcast::Receiver<ConnectionFailure> {
        self.failures_tx.subscribe()
    }

    /// Event sink feeding this engine.
    #[must_use]
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Whether the engine task has exited.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop scanning and end the engine task.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::EngineUnavailable`] if the engine had already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        Ok(self.commands.send(Command::Shutdown).await?)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands.send(command(reply_tx)).await?;
        reply_rx.await.map_err(SightlineError::from)
    }
}
