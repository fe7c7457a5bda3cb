use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ring::{WindowRing, WindowSample};
use crate::frame::FrameSummary;

/// Sums of per-second peaks since the session started. Never reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunningTotals {
    pub detections: u64,
    pub collisions: u64,
}

/// Point-in-time copy of everything the live path exposes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LiveMetrics {
    /// Counts of the most recent frame.
    pub instantaneous: FrameSummary,
    /// Peaks within the second in progress.
    pub current_max: FrameSummary,
    pub totals: RunningTotals,
    /// Finished seconds, oldest first.
    pub window: Vec<WindowSample>,
    pub frames_seen: u64,
    pub seconds_elapsed: u64,
}

/// Parallel series for a "count of people vs time" chart.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub detections: Vec<u32>,
    pub collisions: Vec<u32>,
}

impl LiveMetrics {
    pub fn chart(&self) -> ChartSeries {
        let mut series = ChartSeries::default();
        for sample in &self.window {
            series
                .labels
                .push(sample.timestamp.format("%H:%M:%S").to_string());
            series.detections.push(sample.max_detections);
            series.collisions.push(sample.max_collisions);
        }
        series
    }
}

/// Per-second peak tracker.
///
/// A second may hold many frames; only the largest count seen during it is
/// kept. [`tick`](Self::tick) closes the second: it records the peaks in the
/// ring, adds them to the running totals, and zeroes them.
#[derive(Clone, Debug)]
pub struct RealTimeAggregator {
    latest: FrameSummary,
    current_max: FrameSummary,
    totals: RunningTotals,
    ring: WindowRing,
    frames_seen: u64,
    seconds_elapsed: u64,
}

impl RealTimeAggregator {
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            latest: FrameSummary::default(),
            current_max: FrameSummary::default(),
            totals: RunningTotals::default(),
            ring: WindowRing::new(ring_capacity),
            frames_seen: 0,
            seconds_elapsed: 0,
        }
    }

    pub fn observe(&mut self, summary: FrameSummary) {
        self.latest = summary;
        self.current_max.detection_count = self
            .current_max
            .detection_count
            .max(summary.detection_count);
        self.current_max.collision_count = self
            .current_max
            .collision_count
            .max(summary.collision_count);
        self.frames_seen += 1;
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> WindowSample {
        let sample = WindowSample {
            timestamp: now,
            max_detections: self.current_max.detection_count,
            max_collisions: self.current_max.collision_count,
        };
        self.ring.push(sample.clone());
        self.totals.detections += u64::from(sample.max_detections);
        self.totals.collisions += u64::from(sample.max_collisions);
        self.current_max = FrameSummary::default();
        self.seconds_elapsed += 1;
        sample
    }

    pub fn instantaneous(&self) -> FrameSummary {
        self.latest
    }

    pub fn current_max(&self) -> FrameSummary {
        self.current_max
    }

    pub fn totals(&self) -> RunningTotals {
        self.totals
    }

    pub fn window(&self) -> &WindowRing {
        &self.ring
    }

    pub fn snapshot(&self) -> LiveMetrics {
        LiveMetrics {
            instantaneous: self.latest,
            current_max: self.current_max,
            totals: self.totals,
            window: self.ring.to_vec(),
            frames_seen: self.frames_seen,
            seconds_elapsed: self.seconds_elapsed,
        }
    }
}

impl Default for RealTimeAggregator {
    fn default() -> Self {
        Self::new(super::ring::DEFAULT_RING_CAPACITY)
    }
}
