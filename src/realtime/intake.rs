//! Frame-intake task: source -> collision resolver -> real-time service.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::service::FrameSink;
use crate::collision::resolve_frame;
use crate::ingest::FrameSource;
use crate::zones::ZoneModel;

/// Totals for one intake run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntakeStats {
    pub frames: u64,
    pub detections: u64,
    pub collisions: u64,
}

/// Pulls frames until the source ends or `shutdown` is set.
///
/// Each frame is resolved against the zone set current at that moment, so
/// a configuration published mid-stream applies from the next frame on.
pub fn run_intake(
    source: &mut dyn FrameSource,
    zones: &ZoneModel,
    sink: &FrameSink,
    shutdown: &AtomicBool,
) -> Result<IntakeStats> {
    let mut stats = IntakeStats::default();
    while !shutdown.load(Ordering::SeqCst) {
        let Some(frame) = source.next_frame()? else {
            log::info!("frame source {} exhausted", source.name());
            break;
        };
        let resolved = resolve_frame(frame, &zones.zones());
        stats.frames += 1;
        stats.detections += u64::from(resolved.summary.detection_count);
        stats.collisions += u64::from(resolved.summary.collision_count);
        sink.submit(resolved.summary)?;
    }
    Ok(stats)
}

/// Runs [`run_intake`] on its own thread.
pub fn spawn_intake(
    mut source: Box<dyn FrameSource>,
    zones: Arc<ZoneModel>,
    sink: FrameSink,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<Result<IntakeStats>>> {
    std::thread::Builder::new()
        .name("frame-intake".to_string())
        .spawn(move || run_intake(source.as_mut(), &zones, &sink, &shutdown))
        .map_err(|e| anyhow!("failed to spawn intake thread: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{BoundingBox, Detection, Frame};
    use crate::geometry::Point;
    use crate::realtime::{RealTimeConfig, RealTimeService};
    use crate::zones::{AggregatorConfig, Zone};
    use std::collections::VecDeque;
    use std::time::Duration;

    struct ScriptedSource {
        frames: VecDeque<Frame>,
    }

    impl FrameSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            Ok(self.frames.pop_front())
        }
    }

    fn left_half() -> AggregatorConfig {
        AggregatorConfig {
            lines: Vec::new(),
            zones: vec![Zone::new(
                "left",
                vec![
                    Point::new(0.0, 0.0),
                    Point::new(0.5, 0.0),
                    Point::new(0.5, 1.0),
                    Point::new(0.0, 1.0),
                ],
                10.0,
            )],
        }
    }

    #[test]
    fn resolves_and_forwards_every_frame() -> Result<()> {
        let frames = (0..4)
            .map(|_| {
                Frame::new(vec![
                    Detection::new(BoundingBox::new(0.1, 0.1, 0.2, 0.2), "person", 0),
                    Detection::new(BoundingBox::new(0.7, 0.1, 0.8, 0.2), "person", 0),
                ])
            })
            .collect();
        let mut source = ScriptedSource { frames };
        let handle = RealTimeService::new(RealTimeConfig {
            ring_capacity: 10,
            tick_interval: Duration::from_secs(3600),
        })
        .spawn()?;
        let zones = ZoneModel::new(left_half());
        let shutdown = AtomicBool::new(false);

        let stats = run_intake(&mut source, &zones, &handle.sink(), &shutdown)?;
        assert_eq!(
            stats,
            IntakeStats {
                frames: 4,
                detections: 8,
                collisions: 4
            }
        );
        let metrics = handle.snapshot()?;
        assert_eq!(metrics.frames_seen, 4);
        assert_eq!(metrics.current_max.collision_count, 1);
        Ok(())
    }

    #[test]
    fn shutdown_flag_stops_before_reading() -> Result<()> {
        let mut source = ScriptedSource {
            frames: VecDeque::from(vec![Frame::default()]),
        };
        let handle = RealTimeService::new(RealTimeConfig::default()).spawn()?;
        let shutdown = AtomicBool::new(true);
        let stats = run_intake(&mut source, &ZoneModel::default(), &handle.sink(), &shutdown)?;
        assert_eq!(stats.frames, 0);
        assert_eq!(source.frames.len(), 1);
        Ok(())
    }
}
