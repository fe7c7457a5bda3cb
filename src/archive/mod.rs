//! Archive layout for detector output.
//!
//! The hub routes each device's messages into one of four numbered
//! sub-partitions and files them per UTC minute:
//! `{device}/{pp}/{YYYY}/{MM}/{DD}/{HH}/{mm}/<blob>`.
//!
//! - `partition`: discovery and caching of the live sub-partition
//! - `record`: blob decoding into timestamped detection records

pub mod partition;
pub mod record;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;

pub use partition::PartitionCache;
pub use record::{decode_blob, ArchiveRecord, DecodedBlob};

/// Number of candidate sub-partitions per device.
pub const PARTITION_COUNT: u8 = 4;

/// Key builder for one device's archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveLayout {
    device_id: String,
}

impl ArchiveLayout {
    pub fn new(device_id: &str) -> Result<Self> {
        let device_id = device_id.trim_matches('/');
        if device_id.is_empty() || device_id.contains('/') {
            return Err(anyhow!("invalid device id {:?}", device_id));
        }
        Ok(Self {
            device_id: device_id.to_string(),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Representative key checked during partition discovery.
    pub fn partition_key(&self, partition: u8) -> String {
        format!("{}/{:02}", self.device_id, partition)
    }

    pub fn minute_key(&self, partition: u8, minute: DateTime<Utc>) -> String {
        format!(
            "{}/{}",
            self.partition_key(partition),
            minute.format("%Y/%m/%d/%H/%M")
        )
    }
}

/// Closed time range `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Endpoints in either order.
    pub fn new(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        if b < a {
            Self { start: b, end: a }
        } else {
            Self { start: a, end: b }
        }
    }

    /// The `minutes` leading up to `now`.
    pub fn last_minutes(now: DateTime<Utc>, minutes: u32) -> Self {
        Self::new(now - Duration::minutes(i64::from(minutes)), now)
    }

    /// Every minute boundary touched by the range, oldest first. Both ends
    /// are inclusive: a range ending at 10:05:30 includes minute 10:05.
    pub fn minutes(&self) -> Vec<DateTime<Utc>> {
        let mut out = Vec::new();
        let Some(first) = floor_minute(self.start) else {
            return out;
        };
        let mut cursor = first;
        while cursor <= self.end {
            out.push(cursor);
            cursor += Duration::minutes(1);
        }
        out
    }

    pub fn minute_count(&self) -> i64 {
        match (floor_minute(self.start), floor_minute(self.end)) {
            (Some(a), Some(b)) => (b - a).num_minutes() + 1,
            _ => 0,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

fn floor_minute(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    at.duration_trunc(Duration::minutes(1)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 28, h, m, s).unwrap()
    }

    #[test]
    fn minute_keys_are_zero_padded_utc() {
        let layout = ArchiveLayout::new("iot-unifiededge-001").unwrap();
        let minute = Utc.with_ymd_and_hms(2020, 6, 8, 3, 5, 59).unwrap();
        assert_eq!(layout.partition_key(2), "iot-unifiededge-001/02");
        assert_eq!(
            layout.minute_key(0, minute),
            "iot-unifiededge-001/00/2020/06/08/03/05"
        );
    }

    #[test]
    fn minutes_are_inclusive_at_both_ends() {
        let range = TimeRange::new(at(23, 28, 40), at(23, 30, 5));
        assert_eq!(range.minutes(), vec![at(23, 28, 0), at(23, 29, 0), at(23, 30, 0)]);
        assert_eq!(range.minute_count(), 3);
    }

    #[test]
    fn inverted_range_is_swapped() {
        let range = TimeRange::new(at(23, 30, 0), at(23, 15, 0));
        assert_eq!(range.start, at(23, 15, 0));
        assert_eq!(range.end, at(23, 30, 0));
        assert_eq!(range.minutes().len(), 16);
    }

    #[test]
    fn last_minutes_window() {
        let range = TimeRange::last_minutes(at(23, 30, 0), 15);
        assert_eq!(range.start, at(23, 15, 0));
        assert!(range.contains(at(23, 20, 0)));
        assert!(!range.contains(at(23, 31, 0)));
    }

    #[test]
    fn rejects_nested_device_ids() {
        assert!(ArchiveLayout::new("").is_err());
        assert!(ArchiveLayout::new("a/b").is_err());
    }
}
