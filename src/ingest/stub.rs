//! Synthetic frame source.
//!
//! People walk left to right at different speeds and heights; each one
//! leaves the frame and re-enters from the left. Output is deterministic
//! apart from timestamps, which use the wall clock.

use anyhow::Result;
use chrono::Utc;
use std::time::{Duration, Instant};

use super::FrameSource;
use crate::frame::{nanos_from_datetime, BoundingBox, Detection, Frame};

const BOX_WIDTH: f64 = 0.08;
const BOX_HEIGHT: f64 = 0.22;

#[derive(Clone, Debug)]
pub struct StubConfig {
    pub name: String,
    /// People walking through the scene.
    pub people: usize,
    pub target_fps: u32,
    /// Stop after this many frames; `None` runs forever.
    pub max_frames: Option<u64>,
    /// Sleep between frames to hold `target_fps`.
    pub paced: bool,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            name: "stub".to_string(),
            people: 4,
            target_fps: 10,
            max_frames: None,
            paced: true,
        }
    }
}

pub struct StubSource {
    config: StubConfig,
    frame_index: u64,
    last_emit: Option<Instant>,
}

impl StubSource {
    pub fn new(config: StubConfig) -> Self {
        Self {
            config,
            frame_index: 0,
            last_emit: None,
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.config.target_fps.max(1)))
    }

    fn synthesize(&self) -> Frame {
        let timestamp = nanos_from_datetime(Utc::now());
        let step = self.frame_index as f64;
        let detections = (0..self.config.people)
            .filter_map(|person| {
                let p = person as f64;
                let speed = 0.004 + 0.002 * p;
                let x = (0.13 * p + step * speed).fract() * (1.0 + BOX_WIDTH) - BOX_WIDTH;
                if x < 0.0 || x + BOX_WIDTH > 1.0 {
                    return None;
                }
                let y = 0.15 + (0.17 * p) % 0.6;
                Some(Detection::new(
                    BoundingBox::new(x, y, x + BOX_WIDTH, y + BOX_HEIGHT),
                    "person",
                    timestamp,
                ))
            })
            .collect();
        Frame {
            detections,
            image_ref: None,
        }
    }
}

impl FrameSource for StubSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(max) = self.config.max_frames {
            if self.frame_index >= max {
                return Ok(None);
            }
        }
        if self.config.paced {
            if let Some(last) = self.last_emit {
                let interval = self.frame_interval();
                let elapsed = last.elapsed();
                if elapsed < interval {
                    std::thread::sleep(interval - elapsed);
                }
            }
            self.last_emit = Some(Instant::now());
        }
        let frame = self.synthesize();
        self.frame_index += 1;
        Ok(Some(frame))
    }
}
