use crate::device::SensorHandle;
use crate::types::{Capabilities, DeviceId, SlotView};

/// Outcome of a tracking acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The engine was free and the pipeline started.
    Acquired,
    /// Another device holds the engine.
    Busy,
    /// The engine was claimable but the hardware failed to start; the slot
    /// is flagged non-functional.
    Failed,
}

/// A viewer slot: owns at most one sensor and, through that sensor's handle,
/// optionally the exclusive tracking capability.
///
/// The slot holds no arbitration logic. It performs synchronous hardware
/// bring-up and teardown and exposes the two-phase tracking API
/// (`release_tracking_if_held` then `try_acquire_tracking`) that the arbiter
/// sequences hand-offs with.
pub struct ViewerSlot {
    handle: Option<Box<dyn SensorHandle>>,
    functional: bool,
}

impl ViewerSlot {
    /// Create a slot bound to `handle`. Streams come up synchronously; an
    /// init failure leaves the slot bound but non-functional.
    pub(crate) fn new(handle: Box<dyn SensorHandle>) -> Self {
        let mut slot = Self {
            handle: None,
            functional: true,
        };
        slot.bind(Some(handle));
        slot
    }

    pub fn device(&self) -> Option<&DeviceId> {
        self.handle.as_ref().map(|h| h.id())
    }

    pub fn capabilities(&self) -> Capabilities {
        self.handle
            .as_ref()
            .map(|h| h.capabilities())
            .unwrap_or(Capabilities::empty())
    }

    /// False after a hardware failure or a forced uninit.
    pub fn is_functional(&self) -> bool {
        self.functional
    }

    pub fn has_tracking(&self) -> bool {
        self.handle.as_ref().map(|h| h.tracking_active()).unwrap_or(false)
    }

    /// Bind a new sensor, or release only when `handle` is `None`.
    ///
    /// A previously bound sensor is fully released first, tracking included.
    /// Binding never claims tracking by itself; acquisition is a separate,
    /// explicit step.
    pub fn bind(&mut self, handle: Option<Box<dyn SensorHandle>>) {
        self.release();
        if let Some(handle) = handle {
            self.handle = Some(handle);
            self.init_in_place();
        }
    }

    /// Drop the bound sensor, releasing streams and tracking.
    pub fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release_tracking();
            handle.shutdown_streams();
            log::debug!("released {}", handle.id());
        }
        self.functional = true;
    }

    /// Tear down and rebuild the binding in place, then attempt to claim the
    /// tracking engine. Used to opportunistically pick up a capability that
    /// just became free.
    pub fn reinitialize(&mut self) -> AcquireOutcome {
        if let Some(handle) = self.handle.as_mut() {
            handle.release_tracking();
            handle.shutdown_streams();
        }
        if !self.init_in_place() {
            return AcquireOutcome::Failed;
        }
        self.try_acquire_tracking()
    }

    /// First phase of a hand-off: give up tracking, keep the device bound.
    pub fn release_tracking_if_held(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if handle.tracking_active() {
                log::debug!("{} releasing tracking", handle.id());
            }
            handle.release_tracking();
        }
    }

    /// Second phase of a hand-off: attempt to claim the free engine.
    pub fn try_acquire_tracking(&mut self) -> AcquireOutcome {
        let Some(handle) = self.handle.as_mut() else {
            return AcquireOutcome::Failed;
        };
        match handle.try_acquire_tracking() {
            Ok(true) => AcquireOutcome::Acquired,
            Ok(false) => AcquireOutcome::Busy,
            Err(e) => {
                log::warn!("tracking start failed on {}: {}", handle.id(), e);
                self.functional = false;
                AcquireOutcome::Failed
            }
        }
    }

    /// Shut the sensor down in place without unbinding. Used when the device
    /// reports an error state: the slot stays visible, marked non-functional.
    pub fn force_uninit(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.release_tracking();
            handle.shutdown_streams();
            log::warn!("{} forced out of service", handle.id());
        }
        self.functional = false;
    }

    pub fn view(&self) -> SlotView {
        SlotView {
            device: self.device().cloned(),
            capabilities: self.capabilities(),
            tracking: self.has_tracking(),
            functional: self.functional,
        }
    }

    /// Synchronous stream bring-up for the current handle. Returns whether
    /// the streams are running; a failure degrades the slot instead of
    /// propagating.
    fn init_in_place(&mut self) -> bool {
        let Some(handle) = self.handle.as_mut() else {
            return false;
        };
        match handle.init_streams() {
            Ok(()) => {
                self.functional = true;
                true
            }
            Err(e) => {
                log::warn!("stream init failed on {}: {}", handle.id(), e);
                self.functional = false;
                false
            }
        }
    }
}
