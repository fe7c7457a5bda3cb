//! Wire formats consumed from the detector.
//!
//! This module provides the shared detection body schema and the parser
//! for live relay messages. Archive envelopes reuse the same body schema.

pub mod payload;

pub use payload::{parse_stream_message, parse_utc, DetectionBody, WireDetection};
