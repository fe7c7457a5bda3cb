//! zone_metricsd - live zone occupancy metrics
//!
//! This daemon:
//! 1. Loads configuration and the zone set
//! 2. Reads detection frames from the configured source
//! 3. Resolves each detection against the current zones
//! 4. Feeds per-second peaks into the real-time aggregator
//! 5. Logs live metrics periodically and reloads the zone file when it changes

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::SystemTime;

use zone_metrics::config::MetricsdConfig;
use zone_metrics::{
    open_source, spawn_intake, AggregatorConfig, LiveMetrics, RealTimeConfig, RealTimeService,
    ZoneModel,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = MetricsdConfig::load()?;
    let zones = Arc::new(ZoneModel::new(load_zones(cfg.zones_path.as_deref())?));
    let mut zones_modified = cfg.zones_path.as_deref().and_then(modified_at);
    log::info!(
        "zone_metricsd running. device={} source={} zones=[{}]",
        cfg.device_id,
        cfg.source,
        zones.snapshot().zone_names()
    );

    let service = RealTimeService::new(RealTimeConfig {
        ring_capacity: cfg.realtime.ring_capacity,
        tick_interval: cfg.realtime.tick,
    })
    .spawn()?;

    let source = open_source(&cfg.source)?;
    let shutdown = Arc::new(AtomicBool::new(false));

    let (tx, rx) = mpsc::channel();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
            let _ = tx.send(());
        })
        .expect("error setting Ctrl-C handler");
    }

    let intake = spawn_intake(source, zones.clone(), service.sink(), shutdown.clone())?;

    loop {
        match rx.recv_timeout(cfg.realtime.report_every) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping...");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
        if intake.is_finished() {
            break;
        }

        log_metrics(&service.snapshot()?);

        if let Some(path) = cfg.zones_path.as_deref() {
            let modified = modified_at(path);
            if modified.is_some() && modified != zones_modified {
                match AggregatorConfig::load(path) {
                    Ok(next) => {
                        zones.replace(next);
                        log::info!(
                            "zones reloaded (version {}): [{}]",
                            zones.version(),
                            zones.snapshot().zone_names()
                        );
                    }
                    Err(e) => log::warn!("zone reload skipped: {}", e),
                }
                zones_modified = modified;
            }
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    let stats = intake
        .join()
        .map_err(|_| anyhow!("frame intake thread panicked"))??;
    log::info!(
        "intake done: frames={} detections={} collisions={}",
        stats.frames,
        stats.detections,
        stats.collisions
    );

    let last = service.stop()?;
    log_metrics(&last);
    Ok(())
}

fn load_zones(path: Option<&Path>) -> Result<AggregatorConfig> {
    match path {
        Some(path) if path.exists() => AggregatorConfig::load(path),
        Some(path) => {
            log::warn!(
                "zone file {} not found; writing default zone set",
                path.display()
            );
            let cfg = AggregatorConfig::with_default_zone();
            cfg.save(path)?;
            Ok(cfg)
        }
        None => Ok(AggregatorConfig::with_default_zone()),
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn log_metrics(metrics: &LiveMetrics) {
    let chart = metrics.chart();
    log::info!(
        "now: detections={} collisions={} | this second max: {}/{} | totals: {}/{} | window={:?}",
        metrics.instantaneous.detection_count,
        metrics.instantaneous.collision_count,
        metrics.current_max.detection_count,
        metrics.current_max.collision_count,
        metrics.totals.detections,
        metrics.totals.collisions,
        chart.detections
    );
}
