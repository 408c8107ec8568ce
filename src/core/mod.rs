//! Core analysis pipeline for the ECG sensor agent.
//!
//! This module contains:
//! - Bounded sample buffers for live display and windowed analysis
//! - The memoized HRV stress-index pipeline
//! - The session merge that prepares a finished recording for export

pub mod buffers;
pub mod hrv;
pub mod merge;

// Re-export commonly used types
pub use buffers::{DisplayBuffer, SlidingWindowCache, BULK_TRIM_RATIO, DISPLAY_CAPACITY};
pub use hrv::{AnalysisError, HrvAnalyzer, StressStats, HISTOGRAM_BINS};
pub use merge::{merge_recording, merge_series, ExportRow};
