//! Bounded window of recent 3-D points for display smoothing.

use std::collections::VecDeque;

use crate::types::Point3;

/// Default window length, in samples.
pub const DEFAULT_WINDOW: usize = 30;

/// Fixed-size window over a stream of 3-D points.
///
/// Purely a display collaborator: it ingests positions and keeps the most
/// recent `capacity`, nothing more.
#[derive(Debug, Clone)]
pub struct PointHistory {
    points: VecDeque<Point3>,
    capacity: usize,
}

impl PointHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a point, evicting the oldest beyond capacity.
    pub fn push(&mut self, point: Point3) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// The most recently pushed point.
    pub fn latest(&self) -> Option<&Point3> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-to-newest iteration over the window.
    pub fn iter(&self) -> impl Iterator<Item = &Point3> {
        self.points.iter()
    }
}

impl Default for PointHistory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
