use std::fmt;

/// Stable identifier for a sensor device.
///
/// Backed by the platform device path (HID backend) or a simulator name.
/// Identity comparison is on this key, never on handle identity, so a device
/// keeps its id across close/reopen of the same port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection status of a device as reported by a registry backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Connected,
    Disconnected,
    Error,
}

/// Status-change event emitted by a device registry backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected(DeviceId),
    Disconnected(DeviceId),
    Error(DeviceId),
}

impl DeviceEvent {
    /// The device this event refers to.
    pub fn device(&self) -> &DeviceId {
        match self {
            DeviceEvent::Connected(id) | DeviceEvent::Disconnected(id) | DeviceEvent::Error(id) => {
                id
            }
        }
    }

    pub fn status(&self) -> DeviceStatus {
        match self {
            DeviceEvent::Connected(_) => DeviceStatus::Connected,
            DeviceEvent::Disconnected(_) => DeviceStatus::Disconnected,
            DeviceEvent::Error(_) => DeviceStatus::Error,
        }
    }
}

bitflags::bitflags! {
    /// Stream capability bitmap reported by a sensor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const COLOR    = 1 << 0;
        const DEPTH    = 1 << 1;
        const TRACKING = 1 << 2;
        const AUDIO    = 1 << 3;
        const TILT     = 1 << 4;
    }
}

/// A 3-D position sample, as ingested by the display history window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Externally visible state of one viewer slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub device: Option<DeviceId>,
    pub capabilities: Capabilities,
    pub tracking: bool,
    pub functional: bool,
}

/// Banner the host UI should show next to the viewer grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachHint {
    /// No device connected at all.
    Insert,
    /// Free slot available for another device.
    InsertAnother,
    /// More devices connected than slots; switching makes sense.
    Switch,
}

/// Snapshot published after every externally visible transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRefresh {
    /// One view per slot, in pool order.
    pub slots: Vec<SlotView>,
    /// Number of devices the registry currently enumerates.
    pub connected: usize,
    pub hint: Option<AttachHint>,
}

impl PoolRefresh {
    /// Index of the slot currently holding tracking, if any.
    pub fn tracking_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.tracking)
    }
}

/// User-facing label derived from the configured minimum device count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRequirement {
    /// The host application needs at least one sensor.
    Required,
    /// Sensors are optional; the application runs without one.
    Optional,
}
