//! BlueZ transport via `bluer`.
//!
//! Device ids are the adapter-reported MAC address strings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bluer::{Adapter, AdapterEvent, AdapterProperty, Address, Session};
use futures::{pin_mut, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Transport;
use crate::engine::EventSink;
use crate::error::{Result, SightlineError};
use crate::filter::RawSighting;
use crate::types::{ConnectionState, DeviceId};

/// Transport backed by the system's default Bluetooth adapter.
pub struct BluezTransport {
    _session: Session,
    adapter: Adapter,
    sink: EventSink,
    powered: Arc<AtomicBool>,
    scan_task: Mutex<Option<JoinHandle<()>>>,
    power_task: JoinHandle<()>,
}

impl std::fmt::Debug for BluezTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BluezTransport")
            .field("adapter", &self.adapter.name())
            .field("powered", &self.is_powered_on())
            .finish_non_exhaustive()
    }
}

impl BluezTransport {
    /// Attach to the default adapter and start watching its power state.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::AdapterNotFound`] if there is no adapter, or
    /// [`SightlineError::Transport`] if BlueZ cannot be reached.
    pub async fn new(sink: EventSink) -> Result<Self> {
        let session = Session::new().await.map_err(transport_error)?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|_| SightlineError::AdapterNotFound)?;
        let powered = Arc::new(AtomicBool::new(
            adapter.is_powered().await.map_err(transport_error)?,
        ));

        info!(
            adapter = adapter.name(),
            powered = powered.load(Ordering::SeqCst),
            "Using Bluetooth adapter"
        );

        let power_task = tokio::spawn(watch_power(
            adapter.clone(),
            Arc::clone(&powered),
            sink.clone(),
        ));

        Ok(Self {
            _session: session,
            adapter,
            sink,
            powered,
            scan_task: Mutex::new(None),
            power_task,
        })
    }

    fn device_address(id: &DeviceId) -> Option<Address> {
        id.as_str().parse().ok()
    }
}

impl Transport for BluezTransport {
    fn name(&self) -> &'static str {
        "bluez"
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
        *slot = Some(tokio::spawn(discover(
            self.adapter.clone(),
            self.sink.clone(),
        )));
    }

    fn stop_scan(&self) {
        // Dropping the discovery stream ends the BlueZ discovery session.
        if let Some(task) = self
            .scan_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    fn connect(&self, id: &DeviceId) {
        let Some(address) = Self::device_address(id) else {
            warn!(device = %id, "Not a Bluetooth address");
            return;
        };
        let adapter = self.adapter.clone();
        let sink = self.sink.clone();
        let id = id.clone();

        tokio::spawn(async move {
            let _ = sink
                .connection_state_changed(id.clone(), ConnectionState::Connecting)
                .await;
            let result = match adapter.device(address) {
                Ok(device) => device.connect().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    let _ = sink
                        .connection_state_changed(id, ConnectionState::Connected)
                        .await;
                }
                Err(e) => {
                    let _ = sink.connection_failed(id.clone(), e.to_string()).await;
                    let _ = sink
                        .connection_state_changed(id, ConnectionState::NotConnected)
                        .await;
                }
            }
        });
    }

    fn disconnect(&self, id: &DeviceId) {
        let Some(address) = Self::device_address(id) else {
            return;
        };
        let adapter = self.adapter.clone();
        let sink = self.sink.clone();
        let id = id.clone();

        tokio::spawn(async move {
            let _ = sink
                .connection_state_changed(id.clone(), ConnectionState::Disconnecting)
                .await;
            if let Ok(device) = adapter.device(address) {
                if let Err(e) = device.disconnect().await {
                    warn!(device = %id, error = %e, "Disconnect failed");
                }
            }
            let _ = sink
                .connection_state_changed(id, ConnectionState::NotConnected)
                .await;
        });
    }
}

impl Drop for BluezTransport {
    fn drop(&mut self) {
        self.stop_scan();
        self.power_task.abort();
    }
}

fn transport_error(e: bluer::Error) -> SightlineError {
    SightlineError::Transport(e.to_string())
}

async fn watch_power(adapter: Adapter, powered: Arc<AtomicBool>, sink: EventSink) {
    let events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Cannot watch adapter power state");
            return;
        }
    };
    pin_mut!(events);

    while let Some(event) = events.next().await {
        if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(on)) = event {
            if powered.swap(on, Ordering::SeqCst) != on {
                info!(powered = on, "Adapter power changed");
                if sink.adapter_state_changed(on).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn discover(adapter: Adapter, sink: EventSink) {
    let stream = match adapter.discover_devices_with_changes().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to start discovery");
            return;
        }
    };
    pin_mut!(stream);
    debug!("Discovery started");

    while let Some(event) = stream.next().await {
        // Property changes on known devices are also reported as DeviceAdded.
        let AdapterEvent::DeviceAdded(address) = event else {
            continue;
        };
        let Ok(device) = adapter.device(address) else {
            continue;
        };
        let Ok(Some(rssi)) = device.rssi().await else {
            continue;
        };
        let address = address.to_string();
        let name = device.name().await.ok().flatten();
        let alias = if name.is_none() {
            device.alias().await.ok()
        } else {
            None
        };
        let fallback = local_name(name.as_deref(), alias, &address);
        let mut sighting = RawSighting::now(address, name, rssi);
        if let Some(fallback) = fallback {
            sighting = sighting.with_local_name(fallback);
        }
        if sink.sighting(sighting).await.is_err() {
            warn!("Engine inbox closed, ending discovery");
            return;
        }
    }
}

/// Alias to report when the device advertised no name.
///
/// Without a name BlueZ reports the address as the alias, written with dashes
/// (`AA-BB-CC-DD-EE-FF`), so an alias in either address form is not a name.
fn local_name(name: Option<&str>, alias: Option<String>, address: &str) -> Option<String> {
    if name.is_some() {
        return None;
    }
    let alias = alias?;
    let trimmed = alias.trim();
    let dashed = address.replace(':', "-");
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case(address)
        || trimmed.eq_ignore_ascii_case(&dashed)
    {
        return None;
    }
    Some(alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

    #[test]
    fn test_dashed_address_alias_is_not_a_name() {
        assert_eq!(
            local_name(None, Some("AA-BB-CC-DD-EE-FF".into()), ADDRESS),
            None
        );
        assert_eq!(
            local_name(None, Some("aa-bb-cc-dd-ee-ff".into()), ADDRESS),
            None
        );
        assert_eq!(local_name(None, Some(ADDRESS.into()), ADDRESS), None);
        assert_eq!(local_name(None, Some("  ".into()), ADDRESS), None);
        assert_eq!(local_name(None, None, ADDRESS), None);
    }

    #[test]
    fn test_user_alias_is_used_without_name() {
        assert_eq!(
            local_name(None, Some("Desk Speaker".into()), ADDRESS),
            Some("Desk Speaker".to_string())
        );
    }

    #[test]
    fn test_advertised_name_wins() {
        assert_eq!(
            local_name(Some("Buds"), Some("Desk Speaker".into()), ADDRESS),
            None
        );
    }

    #[test]
    fn test_nameless_device_is_filtered_out() {
        use crate::filter::{FilterOutcome, Rejection, SightingFilter};

        let local = local_name(None, Some("AA-BB-CC-DD-EE-FF".into()), ADDRESS);
        let mut sighting = RawSighting::now(ADDRESS, None, -40);
        if let Some(local) = local {
            sighting = sighting.with_local_name(local);
        }
        assert!(matches!(
            SightingFilter::default().evaluate(sighting),
            FilterOutcome::Rejected(Rejection::Unnamed)
        ));
    }
}
