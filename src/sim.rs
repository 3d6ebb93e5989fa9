//! In-memory simulated device registry for tests and demos.
//!
//! No hardware involved: a [`SimBus`] is the virtual USB chain. Tests plug,
//! unplug, and fault devices on the bus and feed the returned events to an
//! [`Arbiter`](crate::Arbiter) whose registry view is a [`SimRegistry`].

use std::sync::{Arc, Mutex};

use crate::device::{DeviceRegistry, SensorHandle};
use crate::tracking::{TrackingEngine, TrackingLease};
use crate::types::{Capabilities, DeviceEvent, DeviceId};
use crate::{Result, TrackmuxError};

#[derive(Default)]
struct SimState {
    /// Plug order, which doubles as enumeration order.
    devices: Vec<SimDevice>,
}

struct SimDevice {
    id: DeviceId,
    connected: bool,
    fail_streams: bool,
    fail_tracking: bool,
}

/// Shared control surface for a simulated sensor fleet.
///
/// Clones share the same fleet and the same tracking engine. The mutation
/// methods return the matching [`DeviceEvent`] so callers can feed it
/// straight into an arbiter.
#[derive(Clone, Default)]
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
    engine: TrackingEngine,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared tracking engine behind every simulated handle.
    pub fn engine(&self) -> TrackingEngine {
        self.engine.clone()
    }

    /// Registry view for an arbiter.
    pub fn registry(&self) -> SimRegistry {
        SimRegistry { bus: self.clone() }
    }

    /// Plug a device in (or reconnect a known one).
    pub fn plug(&self, name: &str) -> DeviceEvent {
        let id = DeviceId::new(name);
        self.upsert(name, |d| d.connected = true);
        DeviceEvent::Connected(id)
    }

    /// Unplug a device.
    pub fn unplug(&self, name: &str) -> DeviceEvent {
        let id = DeviceId::new(name);
        self.upsert(name, |d| d.connected = false);
        DeviceEvent::Disconnected(id)
    }

    /// Put a device into an error state. It stays enumerated.
    pub fn fault(&self, name: &str) -> DeviceEvent {
        let id = DeviceId::new(name);
        self.upsert(name, |_| {});
        DeviceEvent::Error(id)
    }

    /// Make the device's next stream init fail (or succeed again).
    pub fn set_fail_streams(&self, name: &str, fail: bool) {
        self.upsert(name, |d| d.fail_streams = fail);
    }

    /// Make tracking acquisition fail at the hardware layer while the
    /// engine itself stays free.
    pub fn set_fail_tracking(&self, name: &str, fail: bool) {
        self.upsert(name, |d| d.fail_tracking = fail);
    }

    fn upsert(&self, name: &str, apply: impl FnOnce(&mut SimDevice)) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let id = DeviceId::new(name);
        if let Some(device) = state.devices.iter_mut().find(|d| d.id == id) {
            apply(device);
        } else {
            let mut device = SimDevice {
                id,
                connected: false,
                fail_streams: false,
                fail_tracking: false,
            };
            apply(&mut device);
            state.devices.push(device);
        }
    }

    fn with_device<T>(&self, id: &DeviceId, read: impl FnOnce(&SimDevice) -> T) -> Option<T> {
        let state = self.state.lock().ok()?;
        state.devices.iter().find(|d| &d.id == id).map(read)
    }
}

/// Registry view over a [`SimBus`].
pub struct SimRegistry {
    bus: SimBus,
}

impl DeviceRegistry for SimRegistry {
    fn devices(&mut self) -> Vec<DeviceId> {
        match self.bus.state.lock() {
            Ok(state) => state
                .devices
                .iter()
                .filter(|d| d.connected)
                .map(|d| d.id.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn open(&mut self, id: &DeviceId) -> Result<Box<dyn SensorHandle>> {
        let connected = self
            .bus
            .with_device(id, |d| d.connected)
            .unwrap_or(false);
        if !connected {
            return Err(TrackmuxError::DeviceNotFound(id.clone()));
        }
        Ok(Box::new(SimSensorHandle {
            id: id.clone(),
            bus: self.bus.clone(),
            streams_up: false,
            lease: None,
        }))
    }
}

struct SimSensorHandle {
    id: DeviceId,
    bus: SimBus,
    streams_up: bool,
    lease: Option<TrackingLease>,
}

impl SensorHandle for SimSensorHandle {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::COLOR | Capabilities::DEPTH | Capabilities::TRACKING
    }

    fn init_streams(&mut self) -> Result<()> {
        let (connected, fail) = self
            .bus
            .with_device(&self.id, |d| (d.connected, d.fail_streams))
            .unwrap_or((false, false));
        if !connected {
            return Err(TrackmuxError::DeviceNotFound(self.id.clone()));
        }
        if fail {
            return Err(TrackmuxError::StreamInit {
                device: self.id.clone(),
                reason: "simulated stream fault".into(),
            });
        }
        self.streams_up = true;
        Ok(())
    }

    fn shutdown_streams(&mut self) {
        self.lease = None;
        self.streams_up = false;
    }

    fn try_acquire_tracking(&mut self) -> Result<bool> {
        if self.lease.is_some() {
            return Ok(true);
        }
        if !self.streams_up {
            return Err(TrackmuxError::StreamInit {
                device: self.id.clone(),
                reason: "streams not initialized".into(),
            });
        }
        let fail = self
            .bus
            .with_device(&self.id, |d| d.fail_tracking)
            .unwrap_or(false);
        if fail {
            return Err(TrackmuxError::StreamInit {
                device: self.id.clone(),
                reason: "simulated tracking fault".into(),
            });
        }
        match self.bus.engine.try_lease(&self.id) {
            Some(lease) => {
                self.lease = Some(lease);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn release_tracking(&mut self) {
        self.lease = None;
    }

    fn tracking_active(&self) -> bool {
        self.lease.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_is_plug_order() {
        let bus = SimBus::new();
        bus.plug("b");
        bus.plug("a");
        bus.plug("c");
        bus.unplug("a");

        let mut registry = bus.registry();
        let ids: Vec<_> = registry.devices().iter().map(|d| d.to_string()).collect();
        assert_eq!(ids, ["b", "c"]);
    }

    #[test]
    fn test_open_disconnected_fails() {
        let bus = SimBus::new();
        bus.plug("a");
        bus.unplug("a");

        let mut registry = bus.registry();
        match registry.open(&DeviceId::new("a")) {
            Err(TrackmuxError::DeviceNotFound(id)) => assert_eq!(id.as_str(), "a"),
            other => panic!("expected DeviceNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_replug_keeps_enumeration_position() {
        let bus = SimBus::new();
        bus.plug("a");
        bus.plug("b");
        bus.unplug("a");
        bus.plug("a");

        let mut registry = bus.registry();
        let ids: Vec<_> = registry.devices().iter().map(|d| d.to_string()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_tracking_requires_streams() {
        let bus = SimBus::new();
        bus.plug("a");

        let mut handle = bus.registry().open(&DeviceId::new("a")).unwrap();
        assert!(handle.try_acquire_tracking().is_err());

        handle.init_streams().unwrap();
        assert!(handle.try_acquire_tracking().unwrap());
        assert!(handle.tracking_active());

        handle.shutdown_streams();
        assert!(!handle.tracking_active());
        assert_eq!(bus.engine().holder(), None);
    }
}
