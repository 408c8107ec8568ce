//! Session merge: reconcile a finished recording with its derived series.
//!
//! A finished session consists of the raw recorded samples, the unwindowed
//! RR series computed over them, and the stress-index history collected
//! during the session. The merge is one coordinated pass over three
//! time-sorted sequences with forward fill, never a nested per-row search.

use crate::acquisition::Sample;
use crate::core::hrv::HrvAnalyzer;
use serde::{Deserialize, Serialize};

/// One exportable row of a merged session.
///
/// `rr` and `si` carry the most recent known value when no series entry
/// matches the row's timestamp exactly; rows before the first known value
/// carry zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub timestamp: f64,
    pub value: i32,
    pub rr: f64,
    pub si: f64,
}

/// Merge recorded samples with pre-computed RR and stress-index series.
///
/// All three inputs must be ascending in time; the series attach on exact
/// timestamp match and forward-fill otherwise. Series entries that match
/// no sample timestamp are dropped, not carried.
pub fn merge_series(
    samples: &[Sample],
    rr_series: &[(f64, f64)],
    si_history: &[(f64, f64)],
) -> Vec<ExportRow> {
    let mut rr_iter = rr_series.iter().peekable();
    let mut si_iter = si_history.iter().peekable();
    let mut last_rr = 0.0;
    let mut last_si = 0.0;

    let mut rows = Vec::with_capacity(samples.len());
    for sample in samples {
        while let Some(&&(ts, value)) = rr_iter.peek() {
            if ts < sample.timestamp {
                rr_iter.next();
            } else if ts == sample.timestamp {
                last_rr = value;
                rr_iter.next();
            } else {
                break;
            }
        }
        while let Some(&&(ts, value)) = si_iter.peek() {
            if ts < sample.timestamp {
                si_iter.next();
            } else if ts == sample.timestamp {
                last_si = value;
                si_iter.next();
            } else {
                break;
            }
        }
        rows.push(ExportRow {
            timestamp: sample.timestamp,
            value: sample.value,
            rr: last_rr,
            si: last_si,
        });
    }
    rows
}

/// Merge a finished recording into export rows.
///
/// Runs the unwindowed HRV pipeline over the full recording to obtain the
/// RR series that back-fills the RR column, then performs the coordinated
/// merge with the session's stress-index history.
pub fn merge_recording(samples: &[Sample], si_history: &[(f64, f64)]) -> Vec<ExportRow> {
    let analyzer = HrvAnalyzer::new(samples, -1);
    let (intervals, aligned) = analyzer.rr_intervals();
    let rr_series: Vec<(f64, f64)> = aligned
        .iter()
        .zip(intervals)
        .map(|(&ts, &rr)| (ts, rr))
        .collect();
    merge_series(samples, &rr_series, si_history)
}
