//! hidapi-backed device registry and hotplug watcher.
//!
//! Device identity is the platform HID path, which stays stable for a given
//! port. Hotplug is detected by polling enumeration and diffing consecutive
//! snapshots; hidapi has no native hotplug callbacks.

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use hidapi::{HidApi, HidDevice};

use crate::device::{DeviceRegistry, SensorHandle};
use crate::tracking::{TrackingEngine, TrackingLease};
use crate::types::{Capabilities, DeviceEvent, DeviceId};
use crate::{Result, TrackmuxError};

fn create_hid_api() -> Result<HidApi> {
    let api = HidApi::new()?;
    #[cfg(target_os = "macos")]
    {
        // Keep HID opens shared on macOS to avoid seizing the interface.
        api.set_open_exclusive(false);
    }
    Ok(api)
}

/// Check if a hidapi DeviceInfo matches the configured sensor interface.
fn matches_sensor(d: &hidapi::DeviceInfo, vid: u16, pid: u16) -> bool {
    d.vendor_id() == vid && d.product_id() == pid
}

fn enumerate(api: &HidApi, vid: u16, pid: u16) -> Vec<DeviceId> {
    api.device_list()
        .filter(|d| matches_sensor(d, vid, pid))
        .filter_map(|d| d.path().to_str().ok().map(DeviceId::new))
        .collect()
}

/// hidapi-backed device registry, filtered by VID/PID.
pub struct HidRegistry {
    api: HidApi,
    vid: u16,
    pid: u16,
    engine: TrackingEngine,
    capabilities: Capabilities,
}

impl HidRegistry {
    pub fn new(vid: u16, pid: u16) -> Result<Self> {
        Ok(Self {
            api: create_hid_api()?,
            vid,
            pid,
            engine: TrackingEngine::new(),
            capabilities: Capabilities::COLOR | Capabilities::DEPTH | Capabilities::TRACKING,
        })
    }

    /// Override the capability bitmap reported for matched sensors.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The tracking engine shared by every handle this registry opens.
    pub fn engine(&self) -> TrackingEngine {
        self.engine.clone()
    }
}

impl DeviceRegistry for HidRegistry {
    fn devices(&mut self) -> Vec<DeviceId> {
        if let Err(e) = self.api.refresh_devices() {
            log::warn!("HID enumeration refresh failed: {}", e);
        }
        enumerate(&self.api, self.vid, self.pid)
    }

    fn open(&mut self, id: &DeviceId) -> Result<Box<dyn SensorHandle>> {
        // Stream bring-up happens in init_streams; open only validates the
        // path so a failed bind can still surface the device.
        let path = CString::new(id.as_str())
            .map_err(|_| TrackmuxError::DeviceNotFound(id.clone()))?;
        Ok(Box::new(HidSensorHandle {
            id: id.clone(),
            path,
            device: None,
            engine: self.engine.clone(),
            lease: None,
            capabilities: self.capabilities,
        }))
    }
}

struct HidSensorHandle {
    id: DeviceId,
    path: CString,
    /// Held open while streams are up.
    device: Option<HidDevice>,
    engine: TrackingEngine,
    lease: Option<TrackingLease>,
    capabilities: Capabilities,
}

impl SensorHandle for HidSensorHandle {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn init_streams(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }
        let api = create_hid_api()?;
        let device = api.open_path(&self.path)?;
        self.device = Some(device);
        log::debug!("opened {}", self.id);
        Ok(())
    }

    fn shutdown_streams(&mut self) {
        self.lease = None;
        self.device = None;
    }

    fn try_acquire_tracking(&mut self) -> Result<bool> {
        if self.lease.is_some() {
            return Ok(true);
        }
        if self.device.is_none() {
            return Err(TrackmuxError::StreamInit {
                device: self.id.clone(),
                reason: "streams not initialized".into(),
            });
        }
        match self.engine.try_lease(&self.id) {
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

/// Set difference between consecutive enumeration snapshots, as events.
/// Departures are reported before arrivals so a port re-use never looks
/// like two devices present at once.
fn diff_events(previous: &[DeviceId], current: &[DeviceId]) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    for id in previous {
        if !current.contains(id) {
            events.push(DeviceEvent::Disconnected(id.clone()));
        }
    }
    for id in current {
        if !previous.contains(id) {
            events.push(DeviceEvent::Connected(id.clone()));
        }
    }
    events
}

/// Hotplug watcher thread handle.
///
/// Polls HID enumeration on its own `HidApi` instance and emits
/// connect/disconnect events as the set of matching devices changes.
/// Devices present at spawn time are taken as the baseline; initial
/// discovery is the arbiter's job.
pub struct DeviceWatcher {
    receiver: Receiver<DeviceEvent>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl DeviceWatcher {
    pub fn spawn(vid: u16, pid: u16, poll: Duration) -> Result<DeviceWatcher> {
        let (sender, receiver) = crossbeam_channel::bounded(64);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("trackmux-hotplug".into())
            .spawn(move || watch_loop(vid, pid, poll, sender, stop))
            .map_err(|e| TrackmuxError::Thread(format!("failed to spawn hotplug thread: {}", e)))?;

        Ok(DeviceWatcher {
            receiver,
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Receive the next hotplug event (blocks until available).
    pub fn recv(&self) -> Result<DeviceEvent> {
        self.receiver.recv().map_err(|_| TrackmuxError::Stopped)
    }

    /// Try to receive a hotplug event without blocking.
    pub fn try_recv(&self) -> Option<DeviceEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive a hotplug event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<DeviceEvent> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => TrackmuxError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => TrackmuxError::Stopped,
        })
    }

    /// Stop the watcher and wait for the poll thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch_loop(
    vid: u16,
    pid: u16,
    poll: Duration,
    sender: Sender<DeviceEvent>,
    stop_flag: Arc<AtomicBool>,
) {
    let mut api = match create_hid_api() {
        Ok(api) => api,
        Err(e) => {
            log::warn!("hotplug watcher could not start: {}", e);
            return;
        }
    };
    let mut known = enumerate(&api, vid, pid);

    log::info!("hotplug watcher started ({} device(s) present)", known.len());

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("hotplug watcher stopping (stop flag set)");
            break;
        }
        std::thread::sleep(poll);

        if let Err(e) = api.refresh_devices() {
            log::warn!("HID enumeration refresh failed: {}", e);
            continue;
        }
        let current = enumerate(&api, vid, pid);
        for event in diff_events(&known, &current) {
            log::debug!("hotplug: {:?}", event);
            if sender.send(event).is_err() {
                log::info!("hotplug channel disconnected, stopping watcher");
                return;
            }
        }
        known = current;
    }
}
