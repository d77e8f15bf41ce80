//! Configuration management for the live analyzer
//!
//! Runtime configuration is loaded from a JSON file so capture cadence,
//! retry behaviour and worker timeouts can be tuned without recompiling.
//! Missing or malformed files fall back to defaults with a warning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::analysis::features::DEFAULT_SAMPLE_RATE;
use crate::retry::RetryConfig;

/// Complete analyzer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Capture loop parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Passed through to the capture collaborator (0-100)
    pub sensitivity: u8,
    /// Passed through to the capture collaborator (0-100)
    pub noise_threshold: u8,
    /// Tick interval of the capture loop
    pub update_interval_ms: u64,
    /// Used to convert bin index to Hz
    pub sample_rate: u32,
    /// Samples per frame requested from the capture source
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sensitivity: 50,
            noise_threshold: 30,
            update_interval_ms: 100,
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: 2048,
        }
    }
}

impl CaptureConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// Worker channel parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound on one offload attempt; `None` waits indefinitely
    pub response_timeout_ms: Option<u64>,
}

impl WorkerConfig {
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }
}

/// Rejected configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.field, self.reason)
    }
}

impl std::error::Error for ConfigError {}

impl AnalyzerConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Check values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.update_interval_ms == 0 {
            return Err(ConfigError {
                field: "capture.update_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.capture.sample_rate == 0 {
            return Err(ConfigError {
                field: "capture.sample_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.capture.frame_size == 0 {
            return Err(ConfigError {
                field: "capture.frame_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.capture.sensitivity > 100 || self.capture.noise_threshold > 100 {
            return Err(ConfigError {
                field: "capture",
                reason: "sensitivity and noise_threshold must be within 0-100".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError {
                field: "retry.max_attempts",
                reason: "must allow at least one attempt".to_string(),
            });
        }
        Ok(())
    }
}
