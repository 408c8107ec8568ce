//! ECG Sensor Agent - serial acquisition and HRV stress-index analysis.
//!
//! This library ingests a continuous stream of ECG samples from a
//! line-oriented serial device, maintains bounded in-memory windows for
//! live display and analysis, and derives a heart-rate-variability stress
//! index from detected heartbeats. Finished recording sessions are merged
//! with their derived series and exported as delimited text.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ECG Sensor Agent                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌───────────────┐   ┌────────────┐        │
//! │  │  Serial    │──▶│   Buffers     │──▶│    HRV     │        │
//! │  │  Reader    │   │ display/cache │   │  Analyzer  │        │
//! │  └────────────┘   │  /recording   │   └────────────┘        │
//! │        │          └───────────────┘          │              │
//! │        ▼                                     ▼              │
//! │  ┌────────────┐                      ┌──────────────┐       │
//! │  │  Reader    │                      │ Session merge│       │
//! │  │  events    │                      │  + CSV export│       │
//! │  └────────────┘                      └──────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The reader's background worker is the sole writer of sample data; the
//! host drives analysis by calling [`Monitor::tick`] at a fixed cadence
//! against consistent snapshots.
//!
//! # Example
//!
//! ```no_run
//! use ecg_sensor_agent::{Config, Monitor, TickStatus};
//!
//! let mut monitor = Monitor::new(Config::default());
//! monitor.connect("/dev/ttyACM0").expect("failed to open port");
//!
//! match monitor.tick() {
//!     TickStatus::Reading(r) => println!("stress index {}", r.stress_index),
//!     TickStatus::Collecting { samples } => println!("collecting ({samples})"),
//!     TickStatus::Failed(e) => eprintln!("analysis failed: {e}"),
//! }
//! ```

pub mod acquisition;
pub mod config;
pub mod core;
pub mod export;
pub mod monitor;

// Re-export key types at crate root for convenience
pub use acquisition::{
    LineSource, ReaderConfig, ReaderError, ReaderEvent, ReaderStats, Sample, SerialReader,
};
pub use config::{Config, ConfigError, LimitUnit};
pub use core::{AnalysisError, ExportRow, HrvAnalyzer, StressStats};
pub use monitor::{Monitor, TickReading, TickStatus};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
