//! Bounded in-memory sample buffers for live display and analysis.
//!
//! Two buffers with different retention policies:
//! - [`DisplayBuffer`]: a fixed-capacity ring of the most recent waveform
//!   values, used only for rendering.
//! - [`SlidingWindowCache`]: an arrival-ordered sample window bounded by a
//!   configurable time span, trimmed by a two-tier eviction policy.

use crate::acquisition::Sample;
use std::collections::VecDeque;

/// Number of waveform values retained for live display.
pub const DISPLAY_CAPACITY: usize = 70;

/// Overshoot ratio above which the cache bulk-trims instead of evicting one
/// element at a time. Empirical constant, kept as configured behavior.
pub const BULK_TRIM_RATIO: f64 = 1.25;

/// Fixed-capacity buffer of the most recent waveform values.
///
/// Oldest values are evicted from the front as new ones arrive; length
/// never exceeds [`DISPLAY_CAPACITY`].
#[derive(Debug, Default)]
pub struct DisplayBuffer {
    values: VecDeque<i32>,
}

impl DisplayBuffer {
    pub fn new() -> Self {
        Self {
            values: VecDeque::with_capacity(DISPLAY_CAPACITY),
        }
    }

    /// Append a value, evicting from the front when over capacity.
    pub fn push(&mut self, value: i32) {
        self.values.push_back(value);
        while self.values.len() > DISPLAY_CAPACITY {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of the retained values in arrival order.
    pub fn snapshot(&self) -> Vec<i32> {
        self.values.iter().copied().collect()
    }
}

/// Arrival-ordered sample window spanning at most a configured number of
/// milliseconds of device time.
///
/// Eviction runs after each append (the producer skips it while a recording
/// is active, privileging completeness over cache size):
/// 1. If the span is under the limit, nothing happens.
/// 2. If the span overshoots the limit by [`BULK_TRIM_RATIO`] or more, a
///    proportional count of elements is drained from the front in one step.
/// 3. Otherwise exactly one element is evicted.
///
/// The bulk tier amortizes large corrections (a user abruptly lowering the
/// limit) while steady-state behavior stays O(1) per sample.
#[derive(Debug)]
pub struct SlidingWindowCache {
    samples: VecDeque<Sample>,
    limit_ms: f64,
}

impl SlidingWindowCache {
    pub fn new(limit_ms: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            limit_ms,
        }
    }

    /// Append a sample without trimming. Call [`evict_over_limit`] after,
    /// unless a recording is active.
    ///
    /// [`evict_over_limit`]: SlidingWindowCache::evict_over_limit
    pub fn push(&mut self, sample: Sample) {
        self.samples.push_back(sample);
    }

    /// Current retention limit in milliseconds of device time.
    pub fn limit_ms(&self) -> f64 {
        self.limit_ms
    }

    pub fn set_limit_ms(&mut self, limit_ms: f64) {
        self.limit_ms = limit_ms;
    }

    /// Device-time span between the oldest and newest retained sample.
    pub fn span_ms(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Drive the span back under the limit per the two-tier policy.
    pub fn evict_over_limit(&mut self) {
        if self.samples.len() < 2 {
            return;
        }
        let span = self.span_ms();
        if span < self.limit_ms {
            return;
        }

        let overshoot = span / self.limit_ms;
        if overshoot >= BULK_TRIM_RATIO {
            // Proportional estimate assuming roughly uniform sample spacing.
            let keep = (self.limit_ms * self.samples.len() as f64 / span).floor() as usize;
            let remove = self.samples.len().saturating_sub(keep);
            self.samples.drain(..remove);
        } else {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Copy of the retained samples in arrival order.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: f64) -> Sample {
        Sample::new(ts, 0)
    }

    #[test]
    fn test_display_buffer_capacity() {
        let mut buf = DisplayBuffer::new();
        for v in 0..200 {
            buf.push(v);
            assert!(buf.len() <= DISPLAY_CAPACITY);
        }

        // Exactly the most recent 70 values, in arrival order
        let snap = buf.snapshot();
        assert_eq!(snap.len(), DISPLAY_CAPACITY);
        assert_eq!(snap[0], 130);
        assert_eq!(*snap.last().unwrap(), 199);
    }

    #[test]
    fn test_display_buffer_under_capacity() {
        let mut buf = DisplayBuffer::new();
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.snapshot(), vec![1, 2]);
    }

    #[test]
    fn test_cache_no_eviction_under_limit() {
        let mut cache = SlidingWindowCache::new(1000.0);
        for i in 0..10 {
            cache.push(sample(i as f64 * 50.0));
            cache.evict_over_limit();
        }
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn test_cache_single_eviction_small_overshoot() {
        let mut cache = SlidingWindowCache::new(1000.0);
        // Span 1100 ms, overshoot 1.1 < 1.25: exactly one eviction
        for ts in [0.0, 500.0, 1100.0] {
            cache.push(sample(ts));
        }
        cache.evict_over_limit();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.snapshot()[0].timestamp, 500.0);
    }

    #[test]
    fn test_cache_bulk_trim_large_overshoot() {
        let mut cache = SlidingWindowCache::new(1000.0);
        // 100 samples at 100 ms spacing: span 9900 ms, overshoot 9.9
        for i in 0..100 {
            cache.push(sample(i as f64 * 100.0));
        }
        cache.evict_over_limit();
        // keep = floor(1000 * 100 / 9900) = 10
        assert_eq!(cache.len(), 10);
        assert_eq!(cache.snapshot()[0].timestamp, 9000.0);
    }

    #[test]
    fn test_cache_steady_state_span_bound() {
        let mut cache = SlidingWindowCache::new(1000.0);
        // Fixed-rate appends converge to a span never exceeding
        // limit * BULK_TRIM_RATIO
        for i in 0..5000 {
            cache.push(sample(i as f64 * 10.0));
            cache.evict_over_limit();
            if i > 200 {
                assert!(cache.span_ms() <= 1000.0 * BULK_TRIM_RATIO);
            }
        }
    }

    #[test]
    fn test_cache_limit_shrink_recovers_in_one_step() {
        let mut cache = SlidingWindowCache::new(10_000.0);
        for i in 0..1000 {
            cache.push(sample(i as f64 * 10.0));
            cache.evict_over_limit();
        }
        // Abrupt limit drop triggers the bulk tier on the next append
        cache.set_limit_ms(1000.0);
        cache.push(sample(10_000.0));
        cache.evict_over_limit();
        assert!(cache.span_ms() <= 1000.0 * BULK_TRIM_RATIO);
    }
}
