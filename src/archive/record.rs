//! Archive blob decoding.
//!
//! A blob is newline-delimited text. Each line is either a hub envelope
//! `{"EnqueuedTimeUtc": "...", "Body": "<base64 detection body>"}` or a
//! bare detection body. Lines that fail to decode, carry no detections, or
//! have no usable timestamp are dropped and counted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::frame::{datetime_from_nanos, Detection};
use crate::transport::{parse_utc, DetectionBody};

/// One archived detector frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveRecord {
    pub timestamp: DateTime<Utc>,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Default)]
pub struct DecodedBlob {
    pub records: Vec<ArchiveRecord>,
    pub dropped: u64,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Body")]
    body: String,
    #[serde(rename = "EnqueuedTimeUtc", default)]
    enqueued_time_utc: Option<String>,
}

pub fn decode_blob(blob: &[u8]) -> DecodedBlob {
    let text = String::from_utf8_lossy(blob);
    let mut out = DecodedBlob::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match decode_line(line) {
            Some(record) => out.records.push(record),
            None => out.dropped += 1,
        }
    }
    out
}

fn decode_line(line: &str) -> Option<ArchiveRecord> {
    let value: Value = serde_json::from_str(line).ok()?;
    let (body, enqueued) = if value.get("Body").is_some() {
        let envelope: Envelope = serde_json::from_value(value).ok()?;
        let decoded = STANDARD.decode(envelope.body.trim()).ok()?;
        let body: DetectionBody = serde_json::from_slice(&decoded).ok()?;
        (body, envelope.enqueued_time_utc.as_deref().and_then(parse_utc))
    } else {
        (serde_json::from_value::<DetectionBody>(value).ok()?, None)
    };

    if body.detection_count() == 0 {
        return None;
    }
    let timestamp = body
        .image_time()
        .or(enqueued)
        .or_else(|| body.first_detection_ns().map(datetime_from_nanos))?;
    let frame = body.into_frame(timestamp);
    Some(ArchiveRecord {
        timestamp,
        detections: frame.detections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn envelope(body: &str, enqueued: &str) -> String {
        format!(
            r#"{{"EnqueuedTimeUtc":"{}","Properties":{{}},"Body":"{}"}}"#,
            enqueued,
            STANDARD.encode(body)
        )
    }

    #[test]
    fn decodes_envelopes_and_bare_bodies() {
        let blob = [
            envelope(
                r#"{"detections":[{"bbox":[0.1,0.1,0.2,0.2]}],"image_name":"2020-06-28T23:30:01.250Z"}"#,
                "2020-06-28T23:30:02.0000000Z",
            ),
            r#"{"detections":[{"bbox":[0.1,0.1,0.2,0.2]},{"bbox":[0.3,0.3,0.4,0.4]}],"image_name":"2020-06-28T23:30:03Z"}"#
                .to_string(),
        ]
        .join("\r\n");

        let decoded = decode_blob(blob.as_bytes());
        assert_eq!(decoded.dropped, 0);
        assert_eq!(decoded.records.len(), 2);
        assert_eq!(
            decoded.records[0].timestamp,
            Utc.with_ymd_and_hms(2020, 6, 28, 23, 30, 1).unwrap() + chrono::Duration::milliseconds(250)
        );
        assert_eq!(decoded.records[1].detections.len(), 2);
    }

    #[test]
    fn timestamp_falls_back_to_enqueue_time_then_detection() {
        let enqueued = envelope(
            r#"{"detections":[{"bbox":[0,0,1,1]}]}"#,
            "2020-06-28T23:30:02Z",
        );
        let by_detection = r#"{"detections":[{"bbox":[0,0,1,1],"timestamp":1593387005000000000}]}"#;
        let blob = format!("{}\n{}\n", enqueued, by_detection);

        let decoded = decode_blob(blob.as_bytes());
        assert_eq!(decoded.records.len(), 2);
        assert_eq!(
            decoded.records[0].timestamp,
            Utc.with_ymd_and_hms(2020, 6, 28, 23, 30, 2).unwrap()
        );
        assert_eq!(decoded.records[1].timestamp.timestamp(), 1_593_387_005);
    }

    #[test]
    fn drops_bad_and_empty_records() {
        let blob = [
            "{not json".to_string(),
            r#"{"Body":"!!!not base64!!!"}"#.to_string(),
            envelope(r#"{"detections":[]}"#, "2020-06-28T23:30:02Z"),
            r#"{"cameraId":"cam001"}"#.to_string(),
            r#"{"detections":[{"bbox":[0,0,1,1]}]}"#.to_string(),
            String::new(),
        ]
        .join("\n");

        let decoded = decode_blob(blob.as_bytes());
        assert!(decoded.records.is_empty());
        assert_eq!(decoded.dropped, 5);
    }
}
