// Bounded FIFO history of recent readings
//
// Append-only except for oldest-first eviction at capacity. Readers get an
// owned ordered snapshot; the reconciler owns all writes.

use crate::reading::SensorReading;
use std::collections::VecDeque;

/// Bounded rolling window of readings in arrival order
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<SensorReading>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest entry at capacity
    pub fn push(&mut self, reading: SensorReading) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(reading);
    }

    /// Owned copy of the buffer contents, oldest first
    pub fn snapshot(&self) -> Vec<SensorReading> {
        self.entries.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&SensorReading> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard all entries (session restart)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
