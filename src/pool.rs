use crate::device::SensorHandle;
use crate::slot::ViewerSlot;
use crate::types::{DeviceId, SlotView};
use crate::{Result, TrackmuxError};

/// Ordered, bounded collection of viewer slots.
///
/// Insertion order is the only ordering and serves as the deterministic
/// tie-break for "next" selection. The pool enforces two of the system
/// invariants directly: `len <= max_slots` and one slot per device identity.
pub struct SlotPool {
    slots: Vec<ViewerSlot>,
    max_slots: usize,
}

impl SlotPool {
    pub fn new(max_slots: usize) -> Self {
        Self {
            slots: Vec::with_capacity(max_slots),
            max_slots,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.max_slots
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn get(&self, index: usize) -> Option<&ViewerSlot> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ViewerSlot> {
        self.slots.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewerSlot> {
        self.slots.iter()
    }

    /// Index of the slot bound to `id`. O(n) by device identity.
    pub fn position_of(&self, id: &DeviceId) -> Option<usize> {
        self.slots.iter().position(|s| s.device() == Some(id))
    }

    /// Index of the unique slot currently holding tracking.
    pub fn tracking_holder(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.has_tracking())
    }

    /// Append a new slot bound to `handle`.
    ///
    /// Signals `PoolFull` at capacity and `AlreadyBound` for a device that
    /// already has a slot; the pool is unchanged in both cases.
    pub fn add(&mut self, handle: Box<dyn SensorHandle>) -> Result<usize> {
        if self.is_full() {
            return Err(TrackmuxError::PoolFull(self.max_slots));
        }
        if self.position_of(handle.id()).is_some() {
            return Err(TrackmuxError::AlreadyBound(handle.id().clone()));
        }
        self.slots.push(ViewerSlot::new(handle));
        Ok(self.slots.len() - 1)
    }

    /// Unbind (releasing device and tracking) and drop the slot at `index`.
    pub fn remove(&mut self, index: usize) {
        if index < self.slots.len() {
            let mut slot = self.slots.remove(index);
            slot.release();
        }
    }

    /// Release every slot's device and empty the pool.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.release();
        }
        self.slots.clear();
    }

    /// Cyclic successor, by pool order, of the slot bound to `id`.
    ///
    /// Returns `None` when `id` has no slot or the pool holds a single slot.
    pub fn next_after(&self, id: &DeviceId) -> Option<usize> {
        let pos = self.position_of(id)?;
        if self.slots.len() < 2 {
            return None;
        }
        Some((pos + 1) % self.slots.len())
    }

    /// Snapshot of every slot for the refresh notification.
    pub fn views(&self) -> Vec<SlotView> {
        self.slots.iter().map(|s| s.view()).collect()
    }
}
