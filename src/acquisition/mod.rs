//! Sample acquisition from the serial ECG device.
//!
//! This module provides the line-oriented transport, the sample type with
//! its record parser, and the background producer that fans samples into
//! the shared buffers.

pub mod port;
pub mod reader;
pub mod types;

// Re-export commonly used types
pub use port::{piped_source, LineSource, PipedLineSource, SerialLineSource};
pub use reader::{ReaderConfig, ReaderError, ReaderEvent, ReaderStats, SerialReader};
pub use types::{RecordParseError, Sample};
