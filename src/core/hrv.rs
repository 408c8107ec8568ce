//! HRV stress-index pipeline over one immutable sample sequence.
//!
//! The pipeline runs peaks -> RR intervals -> outlier trim -> histogram
//! stats -> stress index. Each stage is computed at most once per analyzer
//! instance; the host constructs a fresh analyzer per analysis tick against
//! a fresh snapshot, so memoization never goes stale.

use crate::acquisition::Sample;
use statrs::statistics::Statistics;
use std::cell::OnceCell;

/// Number of equal-width histogram bins. Empirical constant, kept as
/// configured behavior.
pub const HISTOGRAM_BINS: usize = 10;

/// Physiologically plausible RR range in milliseconds (open interval).
const RR_MIN_MS: f64 = 400.0;
const RR_MAX_MS: f64 = 1500.0;

/// Width padding added to the histogram span so the maximum element still
/// lands in the top bin.
const BIN_EPSILON: f64 = 0.001;

/// Why a stress-index computation could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisError {
    /// Fewer than two processed RR intervals remain after filtering and
    /// trimming. A "still collecting" condition, not a fault.
    InsufficientIntervals { remaining: usize },
    /// All processed intervals are identical; the stress-index denominator
    /// degenerates.
    ZeroRange,
    /// The mode interval is zero; the stress-index denominator degenerates.
    ZeroMode,
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::InsufficientIntervals { remaining } => {
                write!(f, "only {remaining} processed RR intervals, need at least 2")
            }
            AnalysisError::ZeroRange => write!(f, "RR interval range is zero"),
            AnalysisError::ZeroMode => write!(f, "mode RR interval is zero"),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl AnalysisError {
    /// Whether this condition clears itself as more data arrives.
    pub fn is_still_collecting(&self) -> bool {
        matches!(self, AnalysisError::InsufficientIntervals { .. })
    }
}

/// Histogram-derived scalars of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressStats {
    /// Smallest processed RR interval, seconds
    pub min_rr: f64,
    /// Largest processed RR interval, seconds
    pub max_rr: f64,
    /// max_rr - min_rr
    pub range: f64,
    /// Median element of the most populated bin (the mode interval)
    pub mo: f64,
    /// Fraction of processed intervals falling in the most populated bin
    pub amo: f64,
    /// Number of processed intervals
    pub interval_count: usize,
}

/// Lazy, memoized HRV analysis over one snapshot of samples.
pub struct HrvAnalyzer {
    timestamps: Vec<f64>,
    values: Vec<f64>,
    max_rr_count: i32,
    peaks: OnceCell<Vec<f64>>,
    rr: OnceCell<(Vec<f64>, Vec<f64>)>,
    processed: OnceCell<Result<Vec<f64>, AnalysisError>>,
    stats: OnceCell<Result<StressStats, AnalysisError>>,
}

impl HrvAnalyzer {
    /// Build an analyzer over a sample snapshot.
    ///
    /// `max_rr_count` > 0 keeps only that many trailing RR intervals;
    /// -1 (or 0) analyzes the full series.
    pub fn new(samples: &[Sample], max_rr_count: i32) -> Self {
        Self {
            timestamps: samples.iter().map(|s| s.timestamp).collect(),
            values: samples.iter().map(|s| f64::from(s.value)).collect(),
            max_rr_count,
            peaks: OnceCell::new(),
            rr: OnceCell::new(),
            processed: OnceCell::new(),
            stats: OnceCell::new(),
        }
    }

    /// Timestamps of detected heartbeats.
    ///
    /// A sample at interior index `i` is a peak when its value exceeds
    /// `mean + 2 * stddev` of the full input and is a local maximum.
    /// Fewer than 3 samples yield no peaks.
    pub fn peaks(&self) -> &[f64] {
        self.peaks.get_or_init(|| {
            if self.values.len() < 3 {
                return Vec::new();
            }
            let mean = self.values.iter().mean();
            let std = self.values.iter().population_std_dev();
            let threshold = mean + 2.0 * std;

            let mut peaks = Vec::new();
            for i in 1..self.values.len() - 1 {
                if self.values[i] > threshold
                    && self.values[i] > self.values[i - 1]
                    && self.values[i] >= self.values[i + 1]
                {
                    peaks.push(self.timestamps[i]);
                }
            }
            peaks
        })
    }

    /// RR intervals in milliseconds, paired with the timestamp of the
    /// earlier peak of each pair.
    ///
    /// When `max_rr_count` > 0, only the trailing intervals are kept,
    /// together with their aligned timestamps.
    pub fn rr_intervals(&self) -> (&[f64], &[f64]) {
        let (intervals, aligned) = self.rr.get_or_init(|| {
            let peaks = self.peaks();
            if peaks.len() < 2 {
                return (Vec::new(), Vec::new());
            }
            let mut intervals: Vec<f64> = peaks.windows(2).map(|p| p[1] - p[0]).collect();
            let mut aligned: Vec<f64> = peaks[..peaks.len() - 1].to_vec();

            if self.max_rr_count > 0 {
                let keep = self.max_rr_count as usize;
                if intervals.len() > keep {
                    intervals.drain(..intervals.len() - keep);
                    aligned.drain(..aligned.len() - keep);
                }
            }
            (intervals, aligned)
        });
        (intervals.as_slice(), aligned.as_slice())
    }

    /// Most recent RR interval in milliseconds, if any.
    pub fn latest_rr_ms(&self) -> Option<f64> {
        self.rr_intervals().0.last().copied()
    }

    /// RR intervals filtered to the plausible range, sorted, tail-trimmed,
    /// and converted to seconds.
    pub fn processed_rr_intervals(&self) -> Result<&[f64], AnalysisError> {
        let result = self.processed.get_or_init(|| {
            let processed = process_intervals(self.rr_intervals().0);
            if processed.len() < 2 {
                Err(AnalysisError::InsufficientIntervals {
                    remaining: processed.len(),
                })
            } else {
                Ok(processed)
            }
        });
        match result {
            Ok(v) => Ok(v.as_slice()),
            Err(e) => Err(*e),
        }
    }

    /// Histogram-derived scalars over the processed intervals.
    pub fn stats(&self) -> Result<StressStats, AnalysisError> {
        *self.stats.get_or_init(|| {
            let processed = self.processed_rr_intervals()?;
            Ok(histogram_stats(processed))
        })
    }

    /// The stress index: `100 * AMo / (2 * Mo * Range)`.
    ///
    /// Degenerate denominators surface as [`AnalysisError::ZeroRange`] or
    /// [`AnalysisError::ZeroMode`], never as NaN or infinity.
    pub fn stress_index(&self) -> Result<f64, AnalysisError> {
        let stats = self.stats()?;
        if stats.range == 0.0 {
            return Err(AnalysisError::ZeroRange);
        }
        if stats.mo == 0.0 {
            return Err(AnalysisError::ZeroMode);
        }
        Ok(100.0 * stats.amo / (2.0 * stats.mo * stats.range))
    }
}

/// Filter to (400, 1500) ms, sort ascending, trim `round(0.01 * n)` from
/// each tail, and convert to seconds.
fn process_intervals(intervals: &[f64]) -> Vec<f64> {
    let mut kept: Vec<f64> = intervals
        .iter()
        .copied()
        .filter(|&x| x > RR_MIN_MS && x < RR_MAX_MS)
        .collect();
    kept.sort_by(f64::total_cmp);

    let trim = (kept.len() as f64 * 0.01).round_ties_even() as usize;
    if trim > 0 && kept.len() > 2 * trim {
        kept.drain(kept.len() - trim..);
        kept.drain(..trim);
    } else if trim > 0 {
        kept.clear();
    }

    kept.iter().map(|x| x / 1000.0).collect()
}

/// Partition processed intervals into equal-width bins and derive the
/// mode scalars.
///
/// Bin index is `floor(BINS * (x - min) / (max + eps - min))`; the epsilon
/// keeps the top bin from degenerating to zero width. Ties between bins go
/// to the first-encountered largest in a left-to-right scan.
fn histogram_stats(processed: &[f64]) -> StressStats {
    debug_assert!(processed.len() >= 2);
    let min_rr = processed[0];
    let max_rr = processed[processed.len() - 1];
    let span = max_rr + BIN_EPSILON - min_rr;

    let mut groups: Vec<Vec<f64>> = vec![Vec::new(); HISTOGRAM_BINS];
    for &x in processed {
        let index = (HISTOGRAM_BINS as f64 * (x - min_rr) / span) as usize;
        groups[index].push(x);
    }

    let mut longest = 0;
    for (i, group) in groups.iter().enumerate() {
        if group.len() > groups[longest].len() {
            longest = i;
        }
    }
    let longest_group = &groups[longest];
    let mo = longest_group[longest_group.len() / 2];
    let amo = longest_group.len() as f64 / processed.len() as f64;

    StressStats {
        min_rr,
        max_rr,
        range: max_rr - min_rr,
        mo,
        amo,
        interval_count: processed.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic ECG: flat baseline with amplitude spikes at the given
    /// timestamps, sampled every 10 ms.
    fn synthetic_ecg(peak_times_ms: &[f64], total_ms: f64) -> Vec<Sample> {
        let mut samples = Vec::new();
        let mut t = 0.0;
        while t <= total_ms {
            let value = if peak_times_ms.iter().any(|&p| (p - t).abs() < 1e-9) {
                100
            } else {
                10
            };
            samples.push(Sample::new(t, value));
            t += 10.0;
        }
        samples
    }

    #[test]
    fn test_peaks_require_three_samples() {
        let samples = vec![Sample::new(0.0, 100), Sample::new(10.0, 5)];
        let analyzer = HrvAnalyzer::new(&samples, -1);
        assert!(analyzer.peaks().is_empty());
    }

    #[test]
    fn test_peaks_do_not_mutate_input() {
        let samples = synthetic_ecg(&[500.0, 1200.0], 2000.0);
        let before = samples.clone();
        let analyzer = HrvAnalyzer::new(&samples, -1);
        let first = analyzer.peaks().to_vec();
        let second = analyzer.peaks().to_vec();
        assert_eq!(first, second);
        assert_eq!(samples, before);
    }

    #[test]
    fn test_peak_detection_finds_spikes() {
        let peak_times = [500.0, 1300.0, 2000.0];
        let samples = synthetic_ecg(&peak_times, 2500.0);
        let analyzer = HrvAnalyzer::new(&samples, -1);
        assert_eq!(analyzer.peaks(), &peak_times);
    }

    #[test]
    fn test_rr_intervals_from_peaks() {
        let samples = synthetic_ecg(&[500.0, 1300.0, 2000.0], 2500.0);
        let analyzer = HrvAnalyzer::new(&samples, -1);
        let (intervals, aligned) = analyzer.rr_intervals();
        assert_eq!(intervals, &[800.0, 700.0]);
        // Each interval is aligned to the earlier peak of its pair
        assert_eq!(aligned, &[500.0, 1300.0]);
    }

    #[test]
    fn test_rr_interval_windowing_keeps_trailing() {
        let samples = synthetic_ecg(&[500.0, 1300.0, 2000.0, 2800.0], 3200.0);
        let analyzer = HrvAnalyzer::new(&samples, 2);
        let (intervals, aligned) = analyzer.rr_intervals();
        assert_eq!(intervals, &[700.0, 800.0]);
        assert_eq!(aligned, &[1300.0, 2000.0]);
    }

    #[test]
    fn test_process_intervals_filters_range() {
        let processed = process_intervals(&[300.0, 600.0, 800.0, 1600.0, 400.0, 1500.0]);
        // Open interval: 400 and 1500 themselves are excluded
        assert_eq!(processed, vec![0.6, 0.8]);
    }

    #[test]
    fn test_trim_is_noop_below_fifty() {
        let intervals: Vec<f64> = (0..49).map(|i| 500.0 + i as f64).collect();
        let processed = process_intervals(&intervals);
        assert_eq!(processed.len(), 49);
    }

    #[test]
    fn test_trim_boundary_at_fifty() {
        // round-half-even keeps 0.01 * 50 = 0.5 at zero, so n = 50 is still
        // a strict no-op; n = 51 rounds up and trims one from each end
        let intervals: Vec<f64> = (0..50).map(|i| 500.0 + i as f64).collect();
        assert_eq!(process_intervals(&intervals).len(), 50);

        let intervals: Vec<f64> = (0..51).map(|i| 500.0 + i as f64).collect();
        assert_eq!(process_intervals(&intervals).len(), 49);

        let intervals: Vec<f64> = (0..99).map(|i| 500.0 + i as f64).collect();
        assert_eq!(process_intervals(&intervals).len(), 97);
    }

    #[test]
    fn test_trim_removes_equal_counts_from_each_end() {
        // n = 250: trim = round_ties_even(2.5) = 2 from each end
        let intervals: Vec<f64> = (0..250).map(|i| 500.0 + i as f64).collect();
        let processed = process_intervals(&intervals);
        assert_eq!(processed.len(), 246);
        assert_eq!(processed[0], 0.502);
        assert_eq!(*processed.last().unwrap(), 0.747);

        // Odd length: n = 251, trim = round(2.51) = 3 from each end
        let intervals: Vec<f64> = (0..251).map(|i| 500.0 + i as f64).collect();
        let processed = process_intervals(&intervals);
        assert_eq!(processed.len(), 245);
        assert_eq!(processed[0], 0.503);
        assert_eq!(*processed.last().unwrap(), 0.747);
    }

    #[test]
    fn test_histogram_stats_reference() {
        // Hand-computed: bins span [0.6, 0.901); 0.7 lands in bin 3 twice,
        // so Mo = 0.7, AMo = 2/5, Range = 0.3
        let processed = [0.6, 0.7, 0.7, 0.8, 0.9];
        let stats = histogram_stats(&processed);
        assert_eq!(stats.min_rr, 0.6);
        assert_eq!(stats.max_rr, 0.9);
        assert!((stats.range - 0.3).abs() < 1e-12);
        assert_eq!(stats.mo, 0.7);
        assert!((stats.amo - 0.4).abs() < 1e-12);
        assert_eq!(stats.interval_count, 5);

        // SI = 100 * 0.4 / (2 * 0.7 * 0.3)
        let si = 100.0 * stats.amo / (2.0 * stats.mo * stats.range);
        assert!((si - 95.238_095_238).abs() < 1e-6);
    }

    #[test]
    fn test_histogram_tie_goes_to_first_bin() {
        // 0.6 in bin 0, 0.9 in bin 9: tie resolved left-to-right
        let processed = [0.6, 0.9];
        let stats = histogram_stats(&processed);
        assert_eq!(stats.mo, 0.6);
    }

    #[test]
    fn test_stress_index_zero_range() {
        // Identical intervals: range degenerates to zero
        let peak_times: Vec<f64> = (0..10).map(|i| 500.0 * (i + 1) as f64).collect();
        let samples = synthetic_ecg(&peak_times, 5500.0);
        let analyzer = HrvAnalyzer::new(&samples, -1);
        assert_eq!(analyzer.stress_index(), Err(AnalysisError::ZeroRange));
    }

    #[test]
    fn test_insufficient_intervals_is_still_collecting() {
        let samples = synthetic_ecg(&[500.0, 1200.0], 2000.0);
        let analyzer = HrvAnalyzer::new(&samples, -1);
        let err = analyzer.stress_index().unwrap_err();
        assert!(err.is_still_collecting());
    }

    #[test]
    fn test_full_pipeline_stress_index() {
        // Peaks spaced 600/700/700/800/900 ms apart
        let peak_times = [500.0, 1100.0, 1800.0, 2500.0, 3300.0, 4200.0];
        let samples = synthetic_ecg(&peak_times, 4500.0);
        let analyzer = HrvAnalyzer::new(&samples, -1);

        let (intervals, _) = analyzer.rr_intervals();
        assert_eq!(intervals, &[600.0, 700.0, 700.0, 800.0, 900.0]);

        let si = analyzer.stress_index().unwrap();
        assert!((si - 95.238_095_238).abs() < 1e-6);
        // Memoized: a second call returns the identical result
        assert_eq!(analyzer.stress_index().unwrap(), si);
    }
}
