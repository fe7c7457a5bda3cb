//! Newline-delimited relay message source.
//!
//! Reads one relay message per line (the same JSON the live relay pushes)
//! from a local file or stdin. Lines that are not detection messages are
//! skipped and counted; only I/O failures end the stream with an error.

use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::FrameSource;
use crate::frame::Frame;
use crate::transport::parse_stream_message;

pub struct JsonLinesSource {
    name: String,
    reader: Box<dyn BufRead + Send>,
    line_no: u64,
    skipped: u64,
}

impl JsonLinesSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| anyhow!("failed to open frame source {}: {}", path.display(), e))?;
        Ok(Self::from_reader(
            &path.display().to_string(),
            BufReader::new(file),
        ))
    }

    pub fn stdin() -> Self {
        Self::from_reader("stdin", BufReader::new(std::io::stdin()))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(name: &str, reader: R) -> Self {
        Self {
            name: name.to_string(),
            reader: Box::new(reader),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Lines skipped because they were not detection messages.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl FrameSource for JsonLinesSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(|e| anyhow!("{}: read failed: {}", self.name, e))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            // Bytes go straight to the parser so a non-UTF-8 line is skipped like any other bad line.
            match parse_stream_message(trimmed) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => {
                    self.skipped += 1;
                    log::debug!("{}:{} skipped: {}", self.name, self.line_no, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn yields_frames_and_skips_noise() -> Result<()> {
        let input = concat!(
            r#"{"body": {"detections": [{"bbox": [0.1, 0.1, 0.2, 0.2]}]}}"#,
            "\n\n",
            "not json\n",
            r#"{"body": {"cameraId": "cam001", "featureCount": 2}}"#,
            "\r\n",
            r#"{"body": {"detections": []}}"#,
            "\n",
        );
        let mut source = JsonLinesSource::from_reader("test", Cursor::new(input));

        let first = source.next_frame()?.expect("first frame");
        assert_eq!(first.detections.len(), 1);
        let second = source.next_frame()?.expect("second frame");
        assert!(second.detections.is_empty());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.skipped(), 2);
        Ok(())
    }

    #[test]
    fn invalid_utf8_line_is_skipped() -> Result<()> {
        let mut input = b"{\"body\": {\"detections\": [\xff\xfe]}}\n".to_vec();
        input.extend_from_slice(b"\xff\xff\xff\n");
        input.extend_from_slice(br#"{"body": {"detections": [{"bbox": [0.1, 0.1, 0.2, 0.2]}]}}"#);
        input.push(b'\n');
        let mut source = JsonLinesSource::from_reader("relay", Cursor::new(input));

        let frame = source.next_frame()?.expect("valid frame after bad bytes");
        assert_eq!(frame.detections.len(), 1);
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.skipped(), 2);
        Ok(())
    }
}
