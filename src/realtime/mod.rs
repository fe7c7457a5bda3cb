//! Live aggregation.
//!
//! - `ring`: bounded per-second sample history for charting
//! - `aggregator`: per-second peak state machine (pure, single-threaded)
//! - `service`: thread that owns the aggregator and fires the tick
//! - `intake`: source -> resolver -> service task

pub mod aggregator;
pub mod intake;
pub mod ring;
pub mod service;

pub use aggregator::{ChartSeries, LiveMetrics, RealTimeAggregator, RunningTotals};
pub use intake::{run_intake, spawn_intake, IntakeStats};
pub use ring::{WindowRing, WindowSample, DEFAULT_RING_CAPACITY};
pub use service::{FrameSink, RealTimeConfig, RealTimeHandle, RealTimeService};
