//! Zone Metrics
//!
//! Counts people seen by a camera and how many of them stand inside
//! user-drawn zones, live and over archived history.
//!
//! # Architecture
//!
//! Raw detection frames arrive from a live source or from the archive. The
//! collision resolver tags each detection against the current zone set,
//! then the tagged frames feed one of two aggregators:
//!
//! 1. **Real-time**: per-second peak counts, running totals and a short
//!    trailing window for charting. One thread owns the state; frames and
//!    ticks reach it as messages.
//! 2. **Historical**: per-minute archive blobs over a past range, merged
//!    into one-second buckets with the same peak-per-second semantic.
//!
//! Zone configuration is an immutable value published by atomic swap, so
//! readers never observe a half-edited polygon.
//!
//! # Module Structure
//!
//! - `geometry`: point-in-polygon, segment intersection, bbox-vs-zone
//! - `zones`: Zone, AggregatorConfig, ZoneModel
//! - `frame`: BoundingBox, Detection, Frame, FrameSummary
//! - `collision`: frame resolution against a zone set
//! - `transport`: detection body wire schema
//! - `ingest`: live frame sources
//! - `realtime`: live aggregator, service thread, intake task
//! - `storage`: archive stores (memory, filesystem, SQLite)
//! - `archive`: key layout, partition discovery, blob decoding
//! - `historical`: range queries and one-second bucketing
//! - `config`: daemon configuration

pub mod archive;
pub mod collision;
pub mod config;
pub mod frame;
pub mod geometry;
pub mod historical;
pub mod ingest;
pub mod realtime;
pub mod storage;
pub mod transport;
pub mod zones;

pub use archive::{ArchiveLayout, ArchiveRecord, PartitionCache, TimeRange};
pub use collision::{count_collisions, resolve_frame, ResolvedFrame};
pub use frame::{BoundingBox, Detection, Frame, FrameSummary};
pub use geometry::{
    bounding_box_collides_any_zone, bounding_box_collides_zone, point_in_polygon,
    segments_intersect, Point,
};
pub use historical::{
    bucket_records, CancelToken, HistoricalAggregator, HistoricalReport, QueryStatus,
    ReportTotals, SecondBucket,
};
pub use ingest::{open_source, FrameSource};
pub use realtime::{
    spawn_intake, LiveMetrics, RealTimeAggregator, RealTimeConfig, RealTimeHandle,
    RealTimeService, WindowRing, WindowSample,
};
pub use storage::{ArchiveStore, FilesystemArchiveStore, InMemoryArchiveStore, SqliteArchiveStore};
pub use zones::{AggregatorConfig, Polyline, Zone, ZoneModel, ZoneSet};
