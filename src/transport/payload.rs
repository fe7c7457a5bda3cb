//! Detection payload parsing.
//!
//! The detector publishes one JSON body per frame:
//! `{ "detections": [{ "bbox": [x1, y1, x2, y2], "label": "person", ... }], "image_name": "..." }`.
//! The live relay wraps it as `{ "body": { ... } }`; the archive stores it
//! base64-encoded inside an envelope (see `archive::record`). Both paths
//! end up here.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::frame::{nanos_from_datetime, BoundingBox, Detection, Frame};

const DEFAULT_LABEL: &str = "person";

/// One frame's worth of detector output, as sent on the wire.
#[derive(Debug, Deserialize)]
pub struct DetectionBody {
    /// Absent on non-detection messages (uploads, telemetry). Older
    /// detector builds call this list `inferences`.
    #[serde(default, alias = "inferences")]
    pub detections: Option<Vec<WireDetection>>,

    /// Capture time of the still image, RFC 3339 (e.g. `2020-06-28T23:30:01.123456Z`).
    #[serde(default)]
    pub image_name: Option<String>,
}

/// Detection as emitted by the detector.
#[derive(Debug, Deserialize)]
pub struct WireDetection {
    /// Kept loose so one odd box does not reject the whole body.
    #[serde(default)]
    pub bbox: Option<Value>,

    #[serde(default)]
    pub label: Option<String>,

    /// Nanoseconds since the epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,

    #[serde(default, alias = "score")]
    pub confidence: Option<f32>,
}

impl WireDetection {
    fn bounding_box(&self) -> Option<BoundingBox> {
        let values = self.bbox.as_ref()?.as_array()?;
        if values.len() != 4 {
            return None;
        }
        let mut coords = [0.0f64; 4];
        for (slot, value) in coords.iter_mut().zip(values) {
            *slot = value.as_f64()?;
        }
        Some(BoundingBox::from(coords))
    }

    fn into_detection(self, fallback_ns: i64) -> Detection {
        Detection {
            bbox: self.bounding_box(),
            label: self
                .label
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            timestamp: self.timestamp.unwrap_or(fallback_ns),
            confidence: self.confidence,
            collides: false,
        }
    }
}

impl DetectionBody {
    /// Capture time from `image_name`, when it is a timestamp.
    pub fn image_time(&self) -> Option<DateTime<Utc>> {
        self.image_name.as_deref().and_then(parse_utc)
    }

    /// First detection timestamp, in nanoseconds.
    pub fn first_detection_ns(&self) -> Option<i64> {
        self.detections
            .as_ref()?
            .iter()
            .find_map(|detection| detection.timestamp)
    }

    pub fn detection_count(&self) -> usize {
        self.detections.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Builds a frame. Detections without their own timestamp take `fallback`.
    pub fn into_frame(self, fallback: DateTime<Utc>) -> Frame {
        let fallback_ns = nanos_from_datetime(fallback);
        Frame {
            detections: self
                .detections
                .unwrap_or_default()
                .into_iter()
                .map(|detection| detection.into_detection(fallback_ns))
                .collect(),
            image_ref: self.image_name,
        }
    }
}

/// Parse a live relay message into a frame.
///
/// Accepts `{ "body": { ... } }` or a bare body. Returns an error if:
/// - The JSON is malformed
/// - The body carries no `detections` field (not a detection message)
pub fn parse_stream_message(payload: &[u8]) -> Result<Frame> {
    let mut value: Value =
        serde_json::from_slice(payload).map_err(|e| anyhow!("parse error: {}", e))?;

    let wrapped = value.get("body").is_some_and(Value::is_object);
    let body_value = if wrapped { value["body"].take() } else { value };
    let body: DetectionBody =
        serde_json::from_value(body_value).map_err(|e| anyhow!("invalid body: {}", e))?;

    if body.detections.is_none() {
        return Err(anyhow!("message carries no detections"));
    }

    let captured = body.image_time().unwrap_or_else(Utc::now);
    Ok(body.into_frame(captured))
}

/// Parses RFC 3339, tolerating a missing offset (taken as UTC).
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RELAY_MESSAGE: &str = r#"{
        "body": {
            "detections": [
                {"bbox": [0.1, 0.2, 0.3, 0.4], "label": "person", "timestamp": 1593387001000000000},
                {"bbox": [0.5, 0.5, 0.6, 0.9], "label": "person", "score": 0.91}
            ],
            "image_name": "2020-06-28T23:30:01.500000Z"
        }
    }"#;

    #[test]
    fn parses_relay_message() {
        let frame = parse_stream_message(RELAY_MESSAGE.as_bytes()).unwrap();
        assert_eq!(frame.detections.len(), 2);
        assert_eq!(
            frame.detections[0].bbox,
            Some(BoundingBox::new(0.1, 0.2, 0.3, 0.4))
        );
        assert_eq!(frame.detections[0].timestamp, 1_593_387_001_000_000_000);
        // Falls back to the image capture time.
        assert_eq!(frame.detections[1].timestamp, 1_593_387_001_500_000_000);
        assert_eq!(frame.detections[1].confidence, Some(0.91));
        assert_eq!(
            frame.image_ref.as_deref(),
            Some("2020-06-28T23:30:01.500000Z")
        );
    }

    #[test]
    fn accepts_bare_body() {
        let frame = parse_stream_message(br#"{"detections": []}"#).unwrap();
        assert!(frame.detections.is_empty());
    }

    #[test]
    fn rejects_messages_without_detections() {
        let err = parse_stream_message(br#"{"body": {"image_name": "x"}}"#).unwrap_err();
        assert!(err.to_string().contains("no detections"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_stream_message(b"{not json").is_err());
    }

    #[test]
    fn odd_bbox_keeps_detection_without_box() {
        let frame = parse_stream_message(
            br#"{"detections": [{"bbox": "0.1,0.2"}, {"bbox": [0.1, 0.2, 0.3]}]}"#,
        )
        .unwrap();
        assert_eq!(frame.detections.len(), 2);
        assert!(frame.detections.iter().all(|d| d.bbox.is_none()));
        assert_eq!(frame.detections[0].label, "person");
    }

    #[test]
    fn parse_utc_accepts_missing_offset() {
        let expected = Utc.with_ymd_and_hms(2020, 6, 28, 23, 30, 1).unwrap();
        assert_eq!(parse_utc("2020-06-28T23:30:01Z"), Some(expected));
        assert_eq!(parse_utc("2020-06-28T23:30:01"), Some(expected));
        assert_eq!(parse_utc("cam001"), None);
    }
}
