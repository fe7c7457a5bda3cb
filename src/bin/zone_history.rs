//! zone_history - detection and collision totals over an archived time range

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;

use zone_metrics::config::{validate_device_id, ArchiveBackend, MetricsdConfig};
use zone_metrics::transport::parse_utc;
use zone_metrics::{
    AggregatorConfig, ArchiveLayout, CancelToken, HistoricalAggregator, QueryStatus, TimeRange,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Range start (RFC 3339, UTC if no offset).
    #[arg(long, requires = "end", conflicts_with = "last_minutes")]
    start: Option<String>,
    /// Range end (RFC 3339, UTC if no offset).
    #[arg(long)]
    end: Option<String>,
    /// Query the last N minutes instead of an explicit range.
    #[arg(long)]
    last_minutes: Option<u32>,
    /// Zone configuration JSON applied to the archived detections.
    #[arg(long, env = "ZONE_METRICS_ZONES_PATH")]
    zones: Option<PathBuf>,
    /// Archive backend (filesystem|sqlite|memory).
    #[arg(long)]
    backend: Option<String>,
    /// Archive root directory for the filesystem backend.
    #[arg(long)]
    root: Option<PathBuf>,
    /// Archive database for the sqlite backend.
    #[arg(long)]
    db: Option<String>,
    /// Device id (first archive key segment).
    #[arg(long)]
    device: Option<String>,
    /// Give up after this many seconds and report what was read.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = MetricsdConfig::load()?;
    if let Some(device) = args.device {
        validate_device_id(&device)?;
        cfg.device_id = device;
    }
    if let Some(backend) = args.backend.as_deref() {
        cfg.archive.backend = backend.parse::<ArchiveBackend>()?;
    }
    if let Some(root) = args.root {
        cfg.archive.root = root;
    }
    if let Some(db) = args.db {
        cfg.archive.db_path = db;
    }
    if let Some(secs) = args.timeout_secs {
        cfg.history.query_timeout = std::time::Duration::from_secs(secs);
    }

    let range = match (args.start.as_deref(), args.end.as_deref()) {
        (Some(start), Some(end)) => TimeRange::new(parse_time(start)?, parse_time(end)?),
        (None, Some(end)) => {
            let end = parse_time(end)?;
            let minutes = args
                .last_minutes
                .unwrap_or(cfg.history.default_window_minutes);
            TimeRange::last_minutes(end, minutes)
        }
        _ => TimeRange::last_minutes(
            Utc::now(),
            args.last_minutes
                .unwrap_or(cfg.history.default_window_minutes),
        ),
    };

    let zones = match args.zones.or(cfg.zones_path.clone()) {
        Some(path) => AggregatorConfig::load(&path)?,
        None => AggregatorConfig::with_default_zone(),
    };

    let store = cfg.archive.open_store()?;
    let aggregator = HistoricalAggregator::new(store, ArchiveLayout::new(&cfg.device_id)?)
        .with_max_range_minutes(cfg.history.max_range_minutes);
    let cancel = CancelToken::with_timeout(cfg.history.query_timeout);

    log::info!(
        "querying {} from {} to {} ({} minutes) against zones [{}]",
        cfg.device_id,
        range.start.to_rfc3339(),
        range.end.to_rfc3339(),
        range.minute_count(),
        zones.zone_names()
    );
    let report = aggregator.query(range, &zones.zones, &cancel)?;

    match report.status {
        QueryStatus::NoArchive => log::warn!("no archive available for device {}", cfg.device_id),
        QueryStatus::Truncated => log::warn!(
            "query timed out; report covers {} of {} minutes",
            report.minutes_scanned,
            range.minute_count()
        ),
        QueryStatus::Complete if !report.has_data() => log::info!("no detections in range"),
        QueryStatus::Complete => {}
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_time(raw: &str) -> Result<chrono::DateTime<Utc>> {
    parse_utc(raw).ok_or_else(|| anyhow!("invalid timestamp {:?} (expected RFC 3339)", raw))
}
