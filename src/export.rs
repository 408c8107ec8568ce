//! Delimited export and import of recorded sessions.
//!
//! Two variants share the same reader: the minimal `Time,Value` layout for
//! a raw recording and the extended `Time,Value,RR,SI` layout produced by
//! the session merge.

use crate::acquisition::Sample;
use crate::core::merge::ExportRow;
use chrono::Local;
use std::path::{Path, PathBuf};

/// Header of the extended export variant.
pub const EXTENDED_HEADER: [&str; 4] = ["Time", "Value", "RR", "SI"];

/// Header of the minimal export variant.
pub const MINIMAL_HEADER: [&str; 2] = ["Time", "Value"];

/// Export and import errors.
#[derive(Debug)]
pub enum ExportError {
    Io(String),
    /// A field failed to parse as its expected type
    Parse(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "IO error: {e}"),
            ExportError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::Io(e.to_string())
    }
}

/// Write merged session rows in the extended variant.
pub fn write_rows(path: &Path, rows: &[ExportRow]) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(EXTENDED_HEADER)?;
    for row in rows {
        writer.write_record(&[
            row.timestamp.to_string(),
            row.value.to_string(),
            row.rr.to_string(),
            row.si.to_string(),
        ])?;
    }
    writer.flush().map_err(|e| ExportError::Io(e.to_string()))?;
    Ok(())
}

/// Write a raw recording in the minimal variant.
pub fn write_samples(path: &Path, samples: &[Sample]) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(MINIMAL_HEADER)?;
    for sample in samples {
        writer.write_record(&[sample.timestamp.to_string(), sample.value.to_string()])?;
    }
    writer.flush().map_err(|e| ExportError::Io(e.to_string()))?;
    Ok(())
}

/// Read an extended export back into rows.
pub fn read_rows(path: &Path) -> Result<Vec<ExportRow>, ExportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(ExportRow {
            timestamp: parse_field(&record, 0)?,
            value: parse_field(&record, 1)?,
            rr: parse_field(&record, 2)?,
            si: parse_field(&record, 3)?,
        });
    }
    Ok(rows)
}

/// Read the sample columns of either export variant.
pub fn read_samples(path: &Path) -> Result<Vec<Sample>, ExportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record?;
        samples.push(Sample::new(parse_field(&record, 0)?, parse_field(&record, 1)?));
    }
    Ok(samples)
}

fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    index: usize,
) -> Result<T, ExportError> {
    let field = record
        .get(index)
        .ok_or_else(|| ExportError::Parse(format!("missing field {index}")))?;
    field
        .parse()
        .map_err(|_| ExportError::Parse(format!("bad field {index}: {field:?}")))
}

/// Export file name carrying the wall-clock time of the save.
pub fn timestamped_path(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(format!(
        "{prefix}-{}.csv",
        Local::now().format("%Y-%m-%d-%H-%M-%S")
    ))
}
