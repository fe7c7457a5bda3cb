//! Single-owner real-time aggregation service.
//!
//! One thread owns the [`RealTimeAggregator`]. Frame counts, tick requests
//! and snapshot requests arrive as messages on one channel, and the
//! one-second tick fires on the same thread, so a tick can never interleave
//! with a half-applied frame update.

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::aggregator::{LiveMetrics, RealTimeAggregator};
use super::ring::DEFAULT_RING_CAPACITY;
use crate::frame::FrameSummary;

#[derive(Clone, Debug)]
pub struct RealTimeConfig {
    pub ring_capacity: usize,
    pub tick_interval: Duration,
}

impl Default for RealTimeConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            tick_interval: Duration::from_secs(1),
        }
    }
}

enum Command {
    Frame(FrameSummary),
    Tick,
    Snapshot(Sender<LiveMetrics>),
    Shutdown,
}

/// Cloneable sender half used by intake tasks.
#[derive(Clone)]
pub struct FrameSink {
    tx: Sender<Command>,
}

impl FrameSink {
    pub fn submit(&self, summary: FrameSummary) -> Result<()> {
        self.tx
            .send(Command::Frame(summary))
            .map_err(|_| anyhow!("real-time service stopped"))
    }
}

pub struct RealTimeService {
    cfg: RealTimeConfig,
}

impl RealTimeService {
    pub fn new(cfg: RealTimeConfig) -> Self {
        Self { cfg }
    }

    pub fn spawn(self) -> Result<RealTimeHandle> {
        if self.cfg.tick_interval.is_zero() {
            return Err(anyhow!("tick interval must be greater than zero"));
        }
        let (tx, rx) = mpsc::channel();
        let cfg = self.cfg;
        let join = std::thread::Builder::new()
            .name("realtime-aggregator".to_string())
            .spawn(move || run_service(rx, cfg))?;
        Ok(RealTimeHandle {
            tx,
            join: Some(join),
        })
    }
}

pub struct RealTimeHandle {
    tx: Sender<Command>,
    join: Option<JoinHandle<LiveMetrics>>,
}

impl RealTimeHandle {
    pub fn sink(&self) -> FrameSink {
        FrameSink {
            tx: self.tx.clone(),
        }
    }

    pub fn submit(&self, summary: FrameSummary) -> Result<()> {
        self.send(Command::Frame(summary))
    }

    /// Closes the current second immediately. The regular schedule is unchanged.
    pub fn tick_now(&self) -> Result<()> {
        self.send(Command::Tick)
    }

    /// Metrics as of every message sent before this call.
    pub fn snapshot(&self) -> Result<LiveMetrics> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(Command::Snapshot(reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("real-time service stopped"))
    }

    /// Stops the service and returns its final metrics.
    pub fn stop(mut self) -> Result<LiveMetrics> {
        let _ = self.tx.send(Command::Shutdown);
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("real-time service already stopped"))?;
        join.join()
            .map_err(|_| anyhow!("real-time service thread panicked"))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow!("real-time service stopped"))
    }
}

impl Drop for RealTimeHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.tx.send(Command::Shutdown);
        }
    }
}

fn run_service(rx: Receiver<Command>, cfg: RealTimeConfig) -> LiveMetrics {
    let mut aggregator = RealTimeAggregator::new(cfg.ring_capacity);
    let mut next_tick = Instant::now() + cfg.tick_interval;

    loop {
        // Ticks take priority over queued frames so a busy stream cannot starve them.
        let now = Instant::now();
        if now >= next_tick {
            let sample = aggregator.tick(Utc::now());
            log::trace!(
                "second closed: max_detections={} max_collisions={}",
                sample.max_detections,
                sample.max_collisions
            );
            next_tick += cfg.tick_interval;
            if next_tick <= now {
                // Fell behind (suspended process); resume from now instead of bursting.
                next_tick = now + cfg.tick_interval;
            }
            continue;
        }

        match rx.recv_timeout(next_tick - now) {
            Ok(Command::Frame(summary)) => aggregator.observe(summary),
            Ok(Command::Tick) => {
                aggregator.tick(Utc::now());
            }
            Ok(Command::Snapshot(reply)) => {
                let _ = reply.send(aggregator.snapshot());
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    log::debug!("real-time service stopped");
    aggregator.snapshot()
}
