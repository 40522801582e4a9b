//! Scan and eviction timers.
//!
//! [`ScanScheduler`] is the only owner of timers in the crate. Each timer is
//! a spawned task that posts a [`TimerTick`] into the engine inbox; the
//! engine hands the tick back to [`ScanScheduler::handle_tick`] so that
//! timer work is serialised with sighting processing.
//!
//! Every `start()` opens a new epoch. Ticks carry the epoch they were
//! scheduled in, so a tick that was already queued when its timer got
//! cancelled is recognised as stale and ignored.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::config::{ScanConfig, ScanMode};
use crate::engine::EventSink;
use crate::transport::Transport;

/// Scheduler state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// No timers, radio not scanning.
    #[default]
    Idle,
    /// Timers armed.
    Scanning,
}

/// A timer firing, tagged with the epoch that armed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    /// Time to stop scanning ahead of a restart.
    Restart {
        /// Arming epoch.
        epoch: u64,
    },
    /// Settle delay elapsed; scan again.
    Resume {
        /// Arming epoch.
        epoch: u64,
    },
    /// Duty cycle: start a burst.
    BurstStart {
        /// Arming epoch.
        epoch: u64,
    },
    /// Duty cycle: end the current burst.
    BurstEnd {
        /// Arming epoch.
        epoch: u64,
    },
    /// Time for an eviction sweep.
    Evict {
        /// Arming epoch.
        epoch: u64,
    },
}

impl TimerTick {
    const fn epoch(self) -> u64 {
        match self {
            Self::Restart { epoch }
            | Self::Resume { epoch }
            | Self::BurstStart { epoch }
            | Self::BurstEnd { epoch }
            | Self::Evict { epoch } => epoch,
        }
    }
}

/// What the engine should do after a tick was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick belonged to a cancelled epoch.
    Stale,
    /// The scheduler dealt with it.
    Handled,
    /// Run an eviction sweep.
    EvictionDue,
}

/// Drives scanning and eviction timers against the transport.
pub struct ScanScheduler {
    mode: ScanMode,
    eviction_interval: Duration,
    transport: Arc<dyn Transport>,
    sink: EventSink,
    state: SchedulerState,
    epoch: u64,
    cycle_timer: Option<JoinHandle<()>>,
    eviction_timer: Option<JoinHandle<()>>,
    pending: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("transport", &self.transport.name())
            .finish_non_exhaustive()
    }
}

impl ScanScheduler {
    /// Create an idle scheduler.
    pub fn new(config: &ScanConfig, transport: Arc<dyn Transport>, sink: EventSink) -> Self {
        Self {
            mode: config.mode,
            eviction_interval: config.eviction_interval,
            transport,
            sink,
            state: SchedulerState::Idle,
            epoch: 0,
            cycle_timer: None,
            eviction_timer: None,
            pending: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Configured scan policy.
    #[must_use]
    pub const fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Number of armed periodic timers (scan cycle plus eviction).
    #[must_use]
    pub fn active_timers(&self) -> usize {
        [&self.cycle_timer, &self.eviction_timer]
            .into_iter()
            .flatten()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Whether a settle-delay or burst-end action is outstanding.
    #[must_use]
    pub fn has_pending_action(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Idle to scanning: begin scanning and arm both timers.
    ///
    /// Returns `false` without side effects when already scanning. Must be
    /// called from within a Tokio runtime.
    pub fn start(&mut self) -> bool {
        if self.state == SchedulerState::Scanning {
            debug!("Scheduler already scanning, ignoring start");
            return false;
        }

        self.state = SchedulerState::Scanning;
        self.epoch += 1;
        let epoch = self.epoch;
        let now = Instant::now();

        self.cycle_timer = Some(match self.mode {
            ScanMode::ContinuousWithRestart {
                restart_interval, ..
            } => {
                self.transport.begin_scan();
                self.spawn_periodic(
                    now + restart_interval,
                    restart_interval,
                    TimerTick::Restart { epoch },
                )
            }
            // First burst fires immediately.
            ScanMode::DutyCycled { interval, .. } => {
                self.spawn_periodic(now, interval, TimerTick::BurstStart { epoch })
            }
        });
        self.eviction_timer = Some(self.spawn_periodic(
            now + self.eviction_interval,
            self.eviction_interval,
            TimerTick::Evict { epoch },
        ));

        info!(mode = self.mode.name(), epoch, "Scanning started");
        true
    }

    /// Scanning to idle: cancel every timer and stop scanning.
    ///
    /// Returns `false` without side effects when already idle.
    pub fn stop(&mut self) -> bool {
        if self.state == SchedulerState::Idle {
            return false;
        }
        self.cancel_timers();
        self.transport.stop_scan();
        info!(epoch = self.epoch, "Scanning stopped");
        true
    }

    /// The adapter left the powered-on state: go idle without touching the radio.
    ///
    /// Returns `true` if timers were cancelled.
    pub fn force_idle(&mut self) -> bool {
        if self.state == SchedulerState::Idle {
            return false;
        }
        self.cancel_timers();
        info!(epoch = self.epoch, "Scanning halted, adapter unavailable");
        true
    }

    /// React to a timer firing.
    pub fn handle_tick(&mut self, tick: TimerTick) -> TickOutcome {
        if self.state != SchedulerState::Scanning || tick.epoch() != self.epoch {
            debug!(?tick, current_epoch = self.epoch, "Ignoring stale timer tick");
            return TickOutcome::Stale;
        }

        match (tick, self.mode) {
            (TimerTick::Evict { .. }, _) => TickOutcome::EvictionDue,
            (
                TimerTick::Restart { epoch },
                ScanMode::ContinuousWithRestart { settle_delay, .. },
            ) => {
                debug!("Restarting scan");
                self.transport.stop_scan();
                self.arm_pending(settle_delay, TimerTick::Resume { epoch });
                TickOutcome::Handled
            }
            (TimerTick::Resume { .. }, _) => {
                self.pending = None;
                self.transport.begin_scan();
                TickOutcome::Handled
            }
            (TimerTick::BurstStart { epoch }, ScanMode::DutyCycled { burst, .. }) => {
                debug!("Scan burst starting");
                self.transport.begin_scan();
                self.arm_pending(burst, TimerTick::BurstEnd { epoch });
                TickOutcome::Handled
            }
            (TimerTick::BurstEnd { .. }, _) => {
                self.pending = None;
                self.transport.stop_scan();
                TickOutcome::Handled
            }
            (tick, mode) => {
                debug!(?tick, mode = mode.name(), "Tick does not apply to scan mode");
                TickOutcome::Stale
            }
        }
    }

    fn cancel_timers(&mut self) {
        self.state = SchedulerState::Idle;
        for handle in [
            self.cycle_timer.take(),
            self.eviction_timer.take(),
            self.pending.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }

    fn arm_pending(&mut self, delay: Duration, tick: TimerTick) {
        if let Some(previous) = self.pending.take() {
            previous.abort();
        }
        let sink = self.sink.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sink.tick(tick).await;
        }));
    }

    fn spawn_periodic(&self, first: Instant, period: Duration, tick: TimerTick) -> JoinHandle<()> {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if sink.tick(tick).await.is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineEvent, EngineInbox};
    use crate::transport::mock::{MockTransport, TransportCall};

    fn scheduler(mode: ScanMode) -> (ScanScheduler, Arc<MockTransport>, EngineInbox) {
        let (sink, inbox) = EventSink::channel(64);
        let transport = Arc::new(MockTransport::powered());
        let config = ScanConfig {
            mode,
            ..ScanConfig::default()
        };
        let scheduler = ScanScheduler::new(&config, transport.clone(), sink);
        (scheduler, transport, inbox)
    }

    fn drain_ticks(inbox: &mut EngineInbox) -> Vec<TimerTick> {
        let mut ticks = Vec::new();
        while let Some(event) = inbox.try_recv() {
            if let EngineEvent::Timer(tick) = event {
                ticks.push(tick);
            }
        }
        ticks
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_begins_scan_and_arms_timers() {
        let (mut scheduler, transport, _inbox) = scheduler(ScanMode::continuous());

        assert!(scheduler.start());

        assert_eq!(scheduler.state(), SchedulerState::Scanning);
        assert_eq!(scheduler.active_timers(), 2);
        assert_eq!(transport.calls(), vec![TransportCall::BeginScan]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop() {
        let (mut scheduler, transport, _inbox) = scheduler(ScanMode::continuous());

        assert!(scheduler.start());
        assert!(!scheduler.start());

        assert_eq!(scheduler.active_timers(), 2);
        assert_eq!(transport.count(&TransportCall::BeginScan), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_idle_is_noop() {
        let (mut scheduler, transport, _inbox) = scheduler(ScanMode::continuous());

        assert!(!scheduler.stop());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_start_leaves_single_timers() {
        let (mut scheduler, _transport, mut inbox) = scheduler(ScanMode::continuous());

        scheduler.start();
        scheduler.stop();
        scheduler.start();
        assert_eq!(scheduler.active_timers(), 2);

        tokio::time::sleep(Duration::from_millis(10_001)).await;

        let ticks = drain_ticks(&mut inbox);
        let restarts = ticks
            .iter()
            .filter(|t| matches!(t, TimerTick::Restart { .. }))
            .count();
        let evictions = ticks
            .iter()
            .filter(|t| matches!(t, TimerTick::Evict { .. }))
            .count();
        assert_eq!(restarts, 1);
        assert_eq!(evictions, 2);
        assert!(ticks.iter().all(|t| t.epoch() == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_stops_then_resumes_after_settle_delay() {
        let (mut scheduler, transport, mut inbox) = scheduler(ScanMode::continuous());
        scheduler.start();
        transport.clear();

        tokio::time::sleep(Duration::from_millis(10_001)).await;
        let restart = drain_ticks(&mut inbox)
            .into_iter()
            .find(|t| matches!(t, TimerTick::Restart { .. }))
            .unwrap();

        assert_eq!(scheduler.handle_tick(restart), TickOutcome::Handled);
        assert_eq!(transport.calls(), vec![TransportCall::StopScan]);
        assert!(scheduler.has_pending_action());

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        let resume = drain_ticks(&mut inbox)
            .into_iter()
            .find(|t| matches!(t, TimerTick::Resume { .. }))
            .unwrap();

        assert_eq!(scheduler.handle_tick(resume), TickOutcome::Handled);
        assert_eq!(
            transport.calls(),
            vec![TransportCall::StopScan, TransportCall::BeginScan]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_resume_is_cancelled_by_stop() {
        let (mut scheduler, transport, mut inbox) = scheduler(ScanMode::continuous());
        scheduler.start();

        let epoch = scheduler.epoch;
        scheduler.handle_tick(TimerTick::Restart { epoch });
        assert!(scheduler.has_pending_action());

        scheduler.stop();
        transport.clear();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(drain_ticks(&mut inbox)
            .iter()
            .all(|t| !matches!(t, TimerTick::Resume { .. })));
        // A resume already queued before stop() is stale.
        assert_eq!(
            scheduler.handle_tick(TimerTick::Resume { epoch }),
            TickOutcome::Stale
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_from_previous_epoch_are_stale() {
        let (mut scheduler, _transport, _inbox) = scheduler(ScanMode::continuous());
        scheduler.start();
        let old_epoch = scheduler.epoch;
        scheduler.stop();
        scheduler.start();

        assert_eq!(
            scheduler.handle_tick(TimerTick::Evict { epoch: old_epoch }),
            TickOutcome::Stale
        );
        assert_eq!(
            scheduler.handle_tick(TimerTick::Evict {
                epoch: old_epoch + 1
            }),
            TickOutcome::EvictionDue
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_idle_does_not_touch_radio() {
        let (mut scheduler, transport, _inbox) = scheduler(ScanMode::continuous());
        scheduler.start();
        transport.clear();

        assert!(scheduler.force_idle());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.active_timers(), 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duty_cycle_bursts_immediately() {
        let (mut scheduler, transport, mut inbox) = scheduler(ScanMode::duty_cycled());
        scheduler.start();
        assert!(transport.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(1)).await;
        let burst = drain_ticks(&mut inbox);
        assert_eq!(burst, vec![TimerTick::BurstStart { epoch: 1 }]);

        scheduler.handle_tick(burst[0]);
        assert_eq!(transport.calls(), vec![TransportCall::BeginScan]);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        let end = drain_ticks(&mut inbox);
        assert_eq!(end, vec![TimerTick::BurstEnd { epoch: 1 }]);

        scheduler.handle_tick(end[0]);
        assert_eq!(
            transport.calls(),
            vec![TransportCall::BeginScan, TransportCall::StopScan]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_tick_ignored_in_duty_mode() {
        let (mut scheduler, _transport, _inbox) = scheduler(ScanMode::duty_cycled());
        scheduler.start();
        assert_eq!(
            scheduler.handle_tick(TimerTick::Restart { epoch: 1 }),
            TickOutcome::Stale
        );
    }
}
