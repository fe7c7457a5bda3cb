//! Detection frames.
//!
//! - `BoundingBox`: normalised `[x1, y1, x2, y2]` box from the upstream detector.
//! - `Detection`: one recognised object plus its computed `collides` flag.
//! - `Frame`: every detection produced at one instant.
//! - `FrameSummary`: the counts the aggregators consume.
//!
//! Frames are created by a source, annotated once by the collision resolver
//! and dropped after aggregation.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Axis-aligned box in normalised frame-space. Corner order is not
/// guaranteed, so extents are always computed with absolute differences.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }

    pub fn is_finite(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Closed corner walk `(x1,y1) -> (x2,y1) -> (x2,y2) -> (x1,y2) -> (x1,y1)`.
    pub fn corner_ring(&self) -> [Point; 5] {
        [
            Point::new(self.x1, self.y1),
            Point::new(self.x2, self.y1),
            Point::new(self.x2, self.y2),
            Point::new(self.x1, self.y2),
            Point::new(self.x1, self.y1),
        ]
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One detected object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// `None` when the upstream message carried no usable box. Such a
    /// detection still counts, but can never collide.
    pub bbox: Option<BoundingBox>,
    pub label: String,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Computed by the collision resolver, never trusted from input.
    #[serde(default)]
    pub collides: bool,
}

impl Detection {
    pub fn new(bbox: BoundingBox, label: &str, timestamp: i64) -> Self {
        Self {
            bbox: Some(bbox),
            label: label.to_string(),
            timestamp,
            confidence: None,
            collides: false,
        }
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        datetime_from_nanos(self.timestamp)
    }
}

/// Detections produced at one processing tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl Frame {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            image_ref: None,
        }
    }

    pub fn summary(&self) -> FrameSummary {
        FrameSummary {
            detection_count: self.detections.len() as u32,
            collision_count: self.detections.iter().filter(|d| d.collides).count() as u32,
        }
    }
}

/// Per-frame counts fed into the aggregators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub detection_count: u32,
    pub collision_count: u32,
}

impl FrameSummary {
    pub const fn new(detection_count: u32, collision_count: u32) -> Self {
        Self {
            detection_count,
            collision_count,
        }
    }
}

pub fn datetime_from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

pub fn nanos_from_datetime(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp_millis().saturating_mul(1_000_000))
}
