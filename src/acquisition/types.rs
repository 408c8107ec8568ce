//! Sample type and line-protocol parsing for the serial ECG device.
//!
//! The device emits one record per line: `"<timestamp><ws><value>"`, where
//! the timestamp is a floating-point device-clock value in milliseconds and
//! the value is an integer ADC reading.

use serde::{Deserialize, Serialize};

/// One ECG sample as reported by the device.
///
/// Timestamps come from the device clock and are monotonically
/// nondecreasing, but not guaranteed wall-clock accurate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Device-clock timestamp in milliseconds
    pub timestamp: f64,
    /// Raw ADC reading
    pub value: i32,
}

impl Sample {
    pub fn new(timestamp: f64, value: i32) -> Self {
        Self { timestamp, value }
    }

    /// Parse one newline-terminated device record.
    ///
    /// Leading/trailing whitespace is ignored; the two fields may be
    /// separated by any run of whitespace.
    pub fn parse_line(line: &str) -> Result<Self, RecordParseError> {
        let mut fields = line.split_whitespace();

        let timestamp = fields
            .next()
            .ok_or(RecordParseError::EmptyRecord)?
            .parse::<f64>()
            .map_err(|_| RecordParseError::BadTimestamp)?;

        let value = fields
            .next()
            .ok_or(RecordParseError::MissingValue)?
            .parse::<i32>()
            .map_err(|_| RecordParseError::BadValue)?;

        if fields.next().is_some() {
            return Err(RecordParseError::TrailingFields);
        }

        Ok(Self { timestamp, value })
    }
}

/// Why a device record failed to parse.
///
/// A malformed record is skipped by the acquisition worker, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordParseError {
    EmptyRecord,
    MissingValue,
    BadTimestamp,
    BadValue,
    TrailingFields,
}

impl std::fmt::Display for RecordParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordParseError::EmptyRecord => write!(f, "empty record"),
            RecordParseError::MissingValue => write!(f, "record has no value field"),
            RecordParseError::BadTimestamp => write!(f, "timestamp is not a float"),
            RecordParseError::BadValue => write!(f, "value is not an integer"),
            RecordParseError::TrailingFields => write!(f, "record has more than two fields"),
        }
    }
}

impl std::error::Error for RecordParseError {}
