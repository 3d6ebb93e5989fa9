use crate::types::DeviceId;

/// Errors surfaced by the arbitration layer and its device backends.
#[derive(Debug, thiserror::Error)]
pub enum TrackmuxError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    #[error("device {0} already bound to a slot")]
    AlreadyBound(DeviceId),

    #[error("stream init failed on {device}: {reason}")]
    StreamInit { device: DeviceId, reason: String },

    #[error("tracking engine still busy during hand-off to slot {0}")]
    TrackingContention(usize),

    #[error("slot pool full ({0} slots)")]
    PoolFull(usize),

    #[error("arbiter thread error: {0}")]
    Thread(String),

    #[error("timeout waiting for an event")]
    Timeout,

    #[error("arbiter queue disconnected")]
    Stopped,
}
