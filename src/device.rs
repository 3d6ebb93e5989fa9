use crate::types::{Capabilities, DeviceId};
use crate::Result;

/// Host-side control surface for one opened sensor.
///
/// All calls are synchronous: `init_streams` and `shutdown_streams` block
/// until the hardware transition completes. The arbiter serializes every
/// call behind its request queue, so implementations never see concurrent
/// mutation.
pub trait SensorHandle: Send {
    /// Stable identity of the underlying device.
    fn id(&self) -> &DeviceId;

    /// Streams this sensor can serve.
    fn capabilities(&self) -> Capabilities;

    /// Bring up the non-tracking streams (color, depth).
    fn init_streams(&mut self) -> Result<()>;

    /// Tear the streams down, releasing tracking if held.
    fn shutdown_streams(&mut self);

    /// Attempt to claim the shared tracking engine for this device.
    ///
    /// Returns `Ok(true)` when claimed and running, `Ok(false)` when another
    /// device holds the engine (normal on opportunistic attempts), `Err`
    /// when the engine was free but the hardware failed to start the
    /// pipeline.
    fn try_acquire_tracking(&mut self) -> Result<bool>;

    /// Release the tracking engine if this handle holds it.
    fn release_tracking(&mut self);

    /// True while this handle holds an active tracking pipeline.
    fn tracking_active(&self) -> bool;
}

/// Source of connected devices.
///
/// The registry is the single authority on enumeration order; the arbiter
/// uses that order for every "first unclaimed" and "next after" selection.
pub trait DeviceRegistry: Send {
    /// Currently connected devices, in enumeration order.
    fn devices(&mut self) -> Vec<DeviceId>;

    /// Open a device for binding into a viewer slot.
    fn open(&mut self, id: &DeviceId) -> Result<Box<dyn SensorHandle>>;
}
