//! # trackmux - viewer-slot arbitration for hot-pluggable tracking sensors
//!
//! Manages a bounded pool of viewer slots over hot-pluggable sensor devices
//! that share one exclusive tracking engine. Provides:
//! - Device discovery and hotplug handling (connect, disconnect, error)
//! - Slot assignment with least-disruptive replacement when the pool is full
//! - Hand-off of the exclusive tracking capability between bound devices
//!
//! At most one slot holds tracking at any instant; every other bound device
//! still gets its non-tracking streams. Transfers follow a strict
//! release-before-acquire discipline, so a failure mid-hand-off leaves zero
//! holders, never two.
//!
//! ## Quick Start
//! ```
//! use trackmux::{Arbiter, ArbiterConfig};
//! use trackmux::sim::SimBus;
//!
//! let bus = SimBus::new();
//! bus.plug("front");
//! bus.plug("side");
//!
//! let mut arbiter = Arbiter::new(Box::new(bus.registry()), ArbiterConfig::default());
//! let updates = arbiter.updates();
//! arbiter.populate();
//!
//! // The first discovered device claimed the tracking engine; move it.
//! arbiter.request_tracking_for(1).unwrap();
//! assert_eq!(arbiter.pool().tracking_holder(), Some(1));
//!
//! let refresh = updates.try_recv().unwrap();
//! assert_eq!(refresh.slots.len(), 2);
//! ```
//!
//! Real hardware plugs in through [`hid::HidRegistry`] and
//! [`hid::DeviceWatcher`]; [`ArbiterHandle`] runs the arbiter on its own
//! thread behind a serialized request queue.

pub mod arbiter;
pub mod config;
pub mod device;
pub mod error;
pub mod hid;
pub mod history;
pub mod pool;
pub mod sim;
pub mod slot;
pub mod tracking;
pub mod types;

pub use arbiter::{Arbiter, ArbiterHandle, Request};
pub use config::{ArbiterConfig, ReacquirePolicy};
pub use device::{DeviceRegistry, SensorHandle};
pub use error::TrackmuxError;
pub use history::PointHistory;
pub use pool::SlotPool;
pub use slot::{AcquireOutcome, ViewerSlot};
pub use tracking::{TrackingEngine, TrackingLease};
pub use types::*;

/// Result type alias for trackmux operations.
pub type Result<T> = std::result::Result<T, TrackmuxError>;
