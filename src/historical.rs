//! Historical aggregation over archived detector output.
//!
//! A query walks every minute of the range, fetches that minute's blobs,
//! decodes them into records and groups the records into one-second
//! buckets. Each bucket keeps the peak detection and collision counts of
//! the records merged into it; totals are summed over buckets, the same
//! peak-per-second semantic the live path uses.
//!
//! Collisions are recomputed against the zones passed to the query, not
//! the zones in force when the archive was written.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::archive::{decode_blob, ArchiveLayout, ArchiveRecord, PartitionCache, TimeRange};
use crate::collision::resolve_frame;
use crate::frame::{Detection, Frame};
use crate::storage::ArchiveStore;
use crate::zones::Zone;

pub const DEFAULT_MAX_RANGE_MINUTES: u32 = 24 * 60;

/// Records closer than this to a bucket's anchor join that bucket.
const BUCKET_GAP_MS: i64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Every minute of the range was examined.
    Complete,
    /// Cancelled or timed out; the report covers the minutes examined so far.
    Truncated,
    /// None of the device's sub-partitions exist.
    NoArchive,
}

/// Cooperative cancellation for a query, with an optional deadline.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Archived records believed to come from the same second.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SecondBucket {
    pub anchor: DateTime<Utc>,
    #[serde(skip)]
    pub detections: Vec<Detection>,
    pub records: u32,
    pub max_detections: u32,
    pub max_collisions: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportTotals {
    pub total_detections: u64,
    pub total_collisions: u64,
    pub max_detections_per_second: u32,
    pub max_collisions_per_second: u32,
}

impl ReportTotals {
    pub fn from_buckets(buckets: &[SecondBucket]) -> Self {
        buckets.iter().fold(Self::default(), |mut acc, bucket| {
            acc.total_detections += u64::from(bucket.max_detections);
            acc.total_collisions += u64::from(bucket.max_collisions);
            acc.max_detections_per_second = acc.max_detections_per_second.max(bucket.max_detections);
            acc.max_collisions_per_second = acc.max_collisions_per_second.max(bucket.max_collisions);
            acc
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoricalReport {
    pub status: QueryStatus,
    pub range: TimeRange,
    pub partition: Option<u8>,
    pub minutes_scanned: u32,
    pub minutes_with_data: u32,
    pub records_dropped: u64,
    pub buckets: Vec<SecondBucket>,
    pub totals: ReportTotals,
}

impl HistoricalReport {
    fn empty(status: QueryStatus, range: TimeRange) -> Self {
        Self {
            status,
            range,
            partition: None,
            minutes_scanned: 0,
            minutes_with_data: 0,
            records_dropped: 0,
            buckets: Vec::new(),
            totals: ReportTotals::default(),
        }
    }

    /// False when the range held no detections (or the archive is absent).
    pub fn has_data(&self) -> bool {
        !self.buckets.is_empty()
    }
}

/// Groups records into one-second buckets, in the order given.
///
/// A record joins the open bucket while it lies less than one second from
/// the bucket's anchor; otherwise the bucket closes and the record anchors
/// a new one. The last bucket is always flushed.
pub fn bucket_records(records: &[ArchiveRecord], zones: &[Zone]) -> Vec<SecondBucket> {
    let mut buckets = Vec::new();
    let mut open: Option<SecondBucket> = None;

    for record in records {
        let resolved = resolve_frame(Frame::new(record.detections.clone()), zones);
        let summary = resolved.summary;

        match open.as_mut() {
            Some(bucket)
                if (record.timestamp - bucket.anchor).num_milliseconds().abs() < BUCKET_GAP_MS =>
            {
                bucket.detections.extend(resolved.frame.detections);
                bucket.records += 1;
                bucket.max_detections = bucket.max_detections.max(summary.detection_count);
                bucket.max_collisions = bucket.max_collisions.max(summary.collision_count);
            }
            _ => {
                if let Some(done) = open.take() {
                    buckets.push(done);
                }
                open = Some(SecondBucket {
                    anchor: record.timestamp,
                    detections: resolved.frame.detections,
                    records: 1,
                    max_detections: summary.detection_count,
                    max_collisions: summary.collision_count,
                });
            }
        }
    }

    buckets.extend(open);
    buckets
}

/// Range queries against one device's archive.
///
/// Queries share only the partition cache; each builds its own buckets, so
/// concurrent queries from several threads are fine.
pub struct HistoricalAggregator {
    store: Arc<dyn ArchiveStore>,
    layout: ArchiveLayout,
    partitions: PartitionCache,
    max_range_minutes: u32,
}

impl HistoricalAggregator {
    pub fn new(store: Arc<dyn ArchiveStore>, layout: ArchiveLayout) -> Self {
        Self {
            store,
            layout,
            partitions: PartitionCache::new(),
            max_range_minutes: DEFAULT_MAX_RANGE_MINUTES,
        }
    }

    pub fn with_max_range_minutes(mut self, minutes: u32) -> Self {
        self.max_range_minutes = minutes;
        self
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    pub fn partitions(&self) -> &PartitionCache {
        &self.partitions
    }

    pub fn query(
        &self,
        range: TimeRange,
        zones: &[Zone],
        cancel: &CancelToken,
    ) -> Result<HistoricalReport> {
        // Limit applies to the duration, not the inclusive minute count.
        let span_secs = (range.end - range.start).num_seconds();
        if span_secs > i64::from(self.max_range_minutes) * 60 {
            return Err(anyhow!(
                "query range spans {}s; limit is {} minutes",
                span_secs,
                self.max_range_minutes
            ));
        }
        let minute_count = range.minute_count();

        let Some(partition) = self
            .partitions
            .discover(self.store.as_ref(), &self.layout)?
        else {
            return Ok(HistoricalReport::empty(QueryStatus::NoArchive, range));
        };

        let mut report = HistoricalReport::empty(QueryStatus::Complete, range);
        report.partition = Some(partition);

        let mut records = Vec::new();
        for minute in range.minutes() {
            if cancel.is_cancelled() {
                log::warn!(
                    "historical query cancelled after {} of {} minutes",
                    report.minutes_scanned,
                    minute_count
                );
                report.status = QueryStatus::Truncated;
                break;
            }
            report.minutes_scanned += 1;

            let key = self.layout.minute_key(partition, minute);
            if !self.store.exists(&key)? {
                log::debug!("no archive for minute {}", key);
                continue;
            }
            let blobs = self.store.fetch_batch(&key)?;
            if !blobs.is_empty() {
                report.minutes_with_data += 1;
            }
            for blob in &blobs {
                let decoded = decode_blob(blob);
                report.records_dropped += decoded.dropped;
                records.extend(decoded.records);
            }
            log::debug!("minute {}: {} blobs", key, blobs.len());
        }

        if report.records_dropped > 0 {
            log::warn!(
                "dropped {} undecodable archive records",
                report.records_dropped
            );
        }

        records.sort_by_key(|record| record.timestamp);
        report.buckets = bucket_records(&records, zones);
        report.totals = ReportTotals::from_buckets(&report.buckets);
        Ok(report)
    }
}
