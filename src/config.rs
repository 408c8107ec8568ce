//! Configuration for the ECG sensor agent.

use crate::acquisition::ReaderConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest accepted sliding-window limit.
pub const CACHE_LIMIT_MIN: u32 = 10;
/// Largest accepted sliding-window limit.
pub const CACHE_LIMIT_MAX: u32 = 1200;

/// Unit of the configured cache limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitUnit {
    /// Limit counts seconds of device time
    Seconds,
    /// Limit counts RR intervals; doubles the effective time budget
    RrIntervals,
}

/// Main configuration for the sensor agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default serial port, overridable per invocation
    pub port: Option<String>,

    /// Baud rate of the ECG device
    pub baud_rate: u32,

    /// Bounded serial read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// Sliding-window limit, clamped to [CACHE_LIMIT_MIN, CACHE_LIMIT_MAX]
    pub cache_limit: u32,

    /// How the cache limit is counted
    pub limit_unit: LimitUnit,

    /// Analysis tick cadence in milliseconds
    pub tick_interval_ms: u64,

    /// Minimum cache size before an analysis tick produces a reading
    pub min_analysis_samples: usize,

    /// Directory for exported session files
    pub export_path: PathBuf,

    /// Directory for agent state
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ecg-sensor-agent");

        Self {
            port: None,
            baud_rate: 200,
            read_timeout_ms: 1000,
            cache_limit: 100,
            limit_unit: LimitUnit::Seconds,
            tick_interval_ms: 1000,
            min_analysis_samples: 1000,
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ecg-sensor-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Cache limit clamped to the accepted range.
    pub fn clamped_cache_limit(&self) -> u32 {
        self.cache_limit.clamp(CACHE_LIMIT_MIN, CACHE_LIMIT_MAX)
    }

    /// Effective cache retention in milliseconds of device time.
    ///
    /// An RR-interval limit doubles the time budget, since one interval
    /// spans well under two seconds.
    pub fn effective_cache_limit_ms(&self) -> f64 {
        let multiplier = match self.limit_unit {
            LimitUnit::Seconds => 1.0,
            LimitUnit::RrIntervals => 2.0,
        };
        f64::from(self.clamped_cache_limit()) * 1000.0 * multiplier
    }

    /// Connection parameters derived from this configuration.
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            baud_rate: self.baud_rate,
            read_timeout_ms: self.read_timeout_ms,
            cache_limit_ms: self.effective_cache_limit_ms(),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
