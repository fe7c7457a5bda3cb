//! Live frame sources.
//!
//! This module provides different sources for detection frames:
//! - Newline-delimited relay messages from a local file or stdin
//! - Stub source (synthetic walkers, for demos and tests)
//!
//! A source is a lazy, unbounded, non-restartable sequence. It yields raw
//! frames; collision flags are computed downstream by the resolver.

pub mod file;
pub mod stub;

use anyhow::Result;

use crate::frame::Frame;

pub use file::JsonLinesSource;
pub use stub::{StubConfig, StubSource};

/// Anything that yields detection frames one at a time.
pub trait FrameSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens a source from its configured location.
///
/// - `stub://<name>`: synthetic source
/// - `-`: relay messages on stdin
/// - anything else: path to a newline-delimited message file
pub fn open_source(location: &str) -> Result<Box<dyn FrameSource>> {
    if let Some(name) = location.strip_prefix("stub://") {
        let config = StubConfig {
            name: if name.is_empty() { "stub" } else { name }.to_string(),
            ..StubConfig::default()
        };
        return Ok(Box::new(StubSource::new(config)));
    }
    if location == "-" {
        return Ok(Box::new(JsonLinesSource::stdin()));
    }
    Ok(Box::new(JsonLinesSource::open(std::path::Path::new(
        location,
    ))?))
}
