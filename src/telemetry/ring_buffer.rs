//! # Sample Ring Buffer
//!
//! Fixed-capacity rolling history of validated samples for charting.

use std::collections::VecDeque;
use std::sync::Arc;

use super::sample::Sample;

/// Default number of samples kept for the chart
pub const DEFAULT_CAPACITY: usize = 50;

/// Immutable, cheaply clonable view of the buffer contents (oldest first)
pub type BufferSnapshot = Arc<[Sample]>;

/// Oldest-evicted-first FIFO of samples
///
/// Length never exceeds the capacity given at construction and samples are
/// kept in insertion order.
#[derive(Debug, Clone)]
pub struct SampleRingBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SampleRingBuffer {
    /// Create an empty buffer holding at most `capacity` samples
    ///
    /// A capacity of zero is bumped to one; configuration validation rejects it
    /// before it gets here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one if the buffer is full
    ///
    /// # Returns
    ///
    /// * `Option<Sample>` - The evicted sample, if any
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// Ordered copy of the contents for a renderer
    pub fn snapshot(&self) -> BufferSnapshot {
        self.samples.iter().cloned().collect()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Most recently pushed sample
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SampleRingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
