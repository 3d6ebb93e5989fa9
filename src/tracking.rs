use std::sync::{Arc, Mutex};

use crate::types::DeviceId;

/// Handle to the single shared tracking subsystem.
///
/// The engine hands out at most one live [`TrackingLease`] at a time. Clones
/// share the same underlying engine. A lease releases on drop, so a dropped
/// sensor handle can never leave the engine stuck.
#[derive(Clone, Default)]
pub struct TrackingEngine {
    owner: Arc<Mutex<Option<DeviceId>>>,
}

impl TrackingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device currently holding the engine, if any.
    pub fn holder(&self) -> Option<DeviceId> {
        self.owner.lock().ok().and_then(|owner| owner.clone())
    }

    /// Attempt to lease the engine for `device`.
    ///
    /// Fails while any device, including `device` itself, already holds it.
    /// Callers keep their lease and check it before retrying.
    pub fn try_lease(&self, device: &DeviceId) -> Option<TrackingLease> {
        let mut owner = self.owner.lock().ok()?;
        if owner.is_some() {
            return None;
        }
        *owner = Some(device.clone());
        Some(TrackingLease {
            engine: self.clone(),
            device: device.clone(),
        })
    }
}

/// Exclusive lease on the tracking engine. Released on drop.
pub struct TrackingLease {
    engine: TrackingEngine,
    device: DeviceId,
}

impl TrackingLease {
    /// Device this lease was granted to.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }
}

impl Drop for TrackingLease {
    fn drop(&mut self) {
        if let Ok(mut owner) = self.engine.owner.lock() {
            if owner.as_ref() == Some(&self.device) {
                *owner = None;
            }
        }
    }
}
