use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Default number of per-second samples kept for charting.
pub const DEFAULT_RING_CAPACITY: usize = 10;

/// Peak counts observed during one finished second.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WindowSample {
    pub timestamp: DateTime<Utc>,
    pub max_detections: u32,
    pub max_collisions: u32,
}

/// Bounded FIFO of window samples. Pushing at capacity evicts the oldest.
#[derive(Clone, Debug)]
pub struct WindowRing {
    samples: VecDeque<WindowSample>,
    capacity: usize,
}

impl WindowRing {
    /// A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, returning the evicted one if the ring was full.
    pub fn push(&mut self, sample: WindowSample) -> Option<WindowSample> {
        let evicted = if self.samples.len() >= self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
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

    pub fn latest(&self) -> Option<&WindowSample> {
        self.samples.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &WindowSample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<WindowSample> {
        self.samples.iter().cloned().collect()
    }
}

impl Default for WindowRing {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(second: u32) -> WindowSample {
        WindowSample {
            timestamp: Utc.with_ymd_and_hms(2020, 6, 28, 23, 30, second).unwrap(),
            max_detections: second,
            max_collisions: 0,
        }
    }

    #[test]
    fn eleventh_push_evicts_oldest() {
        let mut ring = WindowRing::new(10);
        for second in 0..10 {
            assert!(ring.push(sample(second)).is_none());
        }
        let evicted = ring.push(sample(10)).expect("ring full");
        assert_eq!(evicted, sample(0));
        assert_eq!(ring.len(), 10);
        let kept: Vec<u32> = ring.iter().map(|s| s.max_detections).collect();
        assert_eq!(kept, (1..=10).collect::<Vec<_>>());
        assert_eq!(ring.latest(), Some(&sample(10)));
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let mut ring = WindowRing::new(0);
        ring.push(sample(1));
        ring.push(sample(2));
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.to_vec(), vec![sample(2)]);
    }
}
