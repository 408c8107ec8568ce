//! Consumer-side driver of the acquisition pipeline.
//!
//! The host calls [`Monitor::tick`] at a fixed cadence. Each tick snapshots
//! the sliding-window cache, runs a fresh analyzer instance over it, and
//! while a recording session is active, accumulates the stress-index
//! history that the session merge consumes. The monitor itself owns no
//! timer and never blocks on I/O.

use crate::acquisition::{LineSource, ReaderError, SerialReader};
use crate::config::{Config, LimitUnit};
use crate::core::hrv::{AnalysisError, HrvAnalyzer};
use crate::core::merge::{merge_recording, ExportRow};

/// One live reading produced by an analysis tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReading {
    pub stress_index: f64,
    /// Most recent RR interval in milliseconds
    pub latest_rr_ms: f64,
}

/// Outcome of one analysis tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickStatus {
    Reading(TickReading),
    /// Not enough data yet; clears itself as samples arrive
    Collecting { samples: usize },
    /// A non-recoverable analysis condition for this snapshot
    Failed(AnalysisError),
}

/// Drives acquisition, live analysis, and session hand-off.
pub struct Monitor {
    config: Config,
    reader: SerialReader,
    si_history: Vec<(f64, f64)>,
}

impl Monitor {
    pub fn new(config: Config) -> Self {
        let reader = SerialReader::new(config.reader_config());
        Self {
            config,
            reader,
            si_history: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Access to connection state, events, and display snapshots.
    pub fn reader(&self) -> &SerialReader {
        &self.reader
    }

    pub fn connect(&mut self, port_name: &str) -> Result<(), ReaderError> {
        self.reader.connect(port_name)
    }

    /// Connect over an arbitrary line source (replay, tests).
    pub fn connect_source(&mut self, source: Box<dyn LineSource>) -> Result<(), ReaderError> {
        self.reader.connect_source(source)
    }

    pub fn disconnect(&mut self) {
        self.reader.disconnect();
    }

    pub fn start_recording(&self) -> Result<(), ReaderError> {
        self.reader.start_recording()
    }

    pub fn is_recording(&self) -> bool {
        self.reader.is_recording()
    }

    /// Run one analysis pass over a fresh cache snapshot.
    ///
    /// The live analysis windows the RR series to the configured limit when
    /// the limit counts RR intervals; during a recording session and for
    /// second-based limits the full snapshot is analyzed.
    pub fn tick(&mut self) -> TickStatus {
        self.reader
            .set_cache_limit_ms(self.config.effective_cache_limit_ms());

        let snapshot = self.reader.cache_snapshot();
        if snapshot.len() < self.config.min_analysis_samples {
            return TickStatus::Collecting {
                samples: snapshot.len(),
            };
        }

        let recording = self.reader.is_recording();
        let max_rr_count = if self.config.limit_unit == LimitUnit::Seconds || recording {
            -1
        } else {
            self.config.clamped_cache_limit() as i32
        };

        let analyzer = HrvAnalyzer::new(&snapshot, max_rr_count);
        match analyzer.stress_index() {
            Ok(stress_index) => {
                let (intervals, aligned) = analyzer.rr_intervals();
                if recording {
                    if let Some(&timestamp) = aligned.last() {
                        self.si_history.push((timestamp, stress_index));
                    }
                }
                TickStatus::Reading(TickReading {
                    stress_index,
                    latest_rr_ms: intervals.last().copied().unwrap_or(0.0),
                })
            }
            Err(e) if e.is_still_collecting() => TickStatus::Collecting {
                samples: snapshot.len(),
            },
            Err(e) => TickStatus::Failed(e),
        }
    }

    /// Stress-index samples accumulated during the active session.
    pub fn si_history(&self) -> &[(f64, f64)] {
        &self.si_history
    }

    /// End the active recording session and merge it for export.
    ///
    /// Returns `None` when no recording is active. The stress-index
    /// history is cleared once the merge completes.
    pub fn finish_session(&mut self) -> Option<Vec<ExportRow>> {
        let samples = self.reader.stop_recording()?;
        let rows = merge_recording(&samples, &self.si_history);
        self.si_history.clear();
        Some(rows)
    }
}
