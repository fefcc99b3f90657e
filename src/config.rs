//! Configuration surface for the sampling and persistence core
//!
//! Supplied by the scene-wiring layer in a real deployment; here loaded
//! from an optional JSON file with CLI overrides applied by the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::persist::CaptureFormat;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Ideal host tick interval, seconds
    pub tick_interval_ideal: f64,
    /// Ideal smoothing factor at the ideal tick interval
    pub smoothing_alpha_ideal: f64,
    /// Seconds between record-buffer flushes
    pub record_flush_interval: f64,
    /// Seconds between output rotations (records and capture folders)
    pub rotation_interval: f64,
    /// Seconds between frame-capture readback requests
    pub capture_interval: f64,
    pub capture_format: CaptureFormat,
    pub output_dir: String,
    pub worker_threads: usize,
    pub queue_depth: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            tick_interval_ideal: 0.02, // 50 Hz
            smoothing_alpha_ideal: 0.3,
            record_flush_interval: 5.0,
            rotation_interval: 45.0,
            capture_interval: 2.0,
            capture_format: CaptureFormat::Lossless,
            output_dir: "vr_telemetry_sessions".to_string(),
            worker_threads: 2,
            queue_depth: 64,
        }
    }
}

impl TelemetryConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: TelemetryConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(config.validated())
    }

    /// Clamp degenerate values instead of failing; each clamp is logged once
    pub fn validated(mut self) -> Self {
        if self.tick_interval_ideal <= 0.0 {
            log::warn!("tick_interval_ideal must be positive, using 0.02");
            self.tick_interval_ideal = 0.02;
        }
        if !(0.0..=1.0).contains(&self.smoothing_alpha_ideal) {
            log::warn!("smoothing_alpha_ideal outside [0,1], using 0.3");
            self.smoothing_alpha_ideal = 0.3;
        }
        if self.record_flush_interval <= 0.0 {
            log::warn!("record_flush_interval must be positive, using 5.0");
            self.record_flush_interval = 5.0;
        }
        if self.rotation_interval < self.record_flush_interval {
            log::warn!("rotation_interval shorter than flush interval, raising to match");
            self.rotation_interval = self.record_flush_interval;
        }
        if self.capture_interval <= 0.0 {
            log::warn!("capture_interval must be positive, using 2.0");
            self.capture_interval = 2.0;
        }
        if self.worker_threads == 0 {
            self.worker_threads = 1;
        }
        if self.queue_depth == 0 {
            self.queue_depth = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TelemetryConfig::default().validated();
        assert_eq!(config.tick_interval_ideal, 0.02);
        assert!(config.rotation_interval >= config.record_flush_interval);
    }

    #[test]
    fn test_degenerate_values_clamped() {
        let config = TelemetryConfig {
            tick_interval_ideal: -1.0,
            smoothing_alpha_ideal: 4.0,
            record_flush_interval: 0.0,
            rotation_interval: 0.0,
            capture_interval: -5.0,
            worker_threads: 0,
            queue_depth: 0,
            ..TelemetryConfig::default()
        }
        .validated();

        assert!(config.tick_interval_ideal > 0.0);
        assert!((0.0..=1.0).contains(&config.smoothing_alpha_ideal));
        assert!(config.rotation_interval >= config.record_flush_interval);
        assert!(config.capture_interval > 0.0);
        assert!(config.worker_threads >= 1);
        assert!(config.queue_depth >= 1);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: TelemetryConfig =
            serde_json::from_str(r#"{"record_flush_interval": 10.0}"#).unwrap();
        assert_eq!(config.record_flush_interval, 10.0);
        assert_eq!(config.tick_interval_ideal, 0.02);
    }
}
