// src/config/mod.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub acquisition: AcquisitionConfig,
    pub history: HistoryConfig,
    pub beat: BeatConfig,
    pub bpm: BpmConfig,
    pub filter: FilterConfig,
    pub session: SessionConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
}

// ACQUISITION -----------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the sample that did not fit, keep what is already queued.
    DropNewest,
    /// Evict the oldest queued sample to make room for the new one.
    DropOldest,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub sample_rate_hz: f64,
    pub channel_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Sleep between source polls when the device has nothing buffered.
    pub worker_poll_interval_ms: u64,
    /// Idle wait used while the session is paused.
    pub pause_poll_interval_ms: u64,
    /// Device-level read timeout, bounds shutdown latency of the worker.
    pub read_timeout_ms: u64,
    pub join_timeout_ms: u64,
    /// Line the sensor emits when its leads are off.
    pub sentinel: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 250.0,
            channel_capacity: 1024,
            overflow_policy: OverflowPolicy::DropNewest,
            worker_poll_interval_ms: 2,
            pause_poll_interval_ms: 50,
            read_timeout_ms: 20,
            join_timeout_ms: 1000,
            sentinel: "!".to_string(),
        }
    }
}

impl AcquisitionConfig {
    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }

    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

// HISTORY ---------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub window_secs: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { window_secs: 10.0 }
    }
}

// BEAT DETECTION --------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BeatConfig {
    pub threshold: f64,
    pub refractory_secs: f64,
    /// Threshold used when re-detecting beats on the filtered signal at
    /// export time. Falls back to `threshold` when unset.
    pub filtered_threshold: Option<f64>,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            threshold: 620.0,
            refractory_secs: 0.25,
            filtered_threshold: None,
        }
    }
}

// BPM ESTIMATION --------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BpmConfig {
    pub window_capacity: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for BpmConfig {
    fn default() -> Self {
        Self {
            window_capacity: 15,
            min_bpm: 40.0,
            max_bpm: 200.0,
        }
    }
}

// FILTERING -------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Identity,
    Cascade,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    pub mode: FilterMode,
    pub f_low: f64,
    pub f_high: f64,
    pub order: usize,
    pub notch_freq: f64,
    pub notch_q: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mode: FilterMode::Cascade,
            f_low: 0.5,
            f_high: 40.0,
            order: 5,
            notch_freq: 50.0,
            notch_q: 30.0,
        }
    }
}

// SESSION ---------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub drain_interval_ms: u64,
    pub publish_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: 10,
            publish_interval_ms: 200,
        }
    }
}

impl SessionConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }
}

// SOURCE ----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Tcp { address: String },
    Device {
        path: PathBuf,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    Simulated { heart_rate_bpm: f64, seed: Option<u64> },
}

fn default_baud_rate() -> u32 {
    9600
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Tcp {
            address: "127.0.0.1:8080".to_string(),
        }
    }
}

// LOGGING ---------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Number of history points kept under the nominal sample rate.
    pub fn history_capacity(&self) -> usize {
        ((self.acquisition.sample_rate_hz * self.history.window_secs).ceil() as usize).max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(self.acquisition.sample_rate_hz > 0.0) {
            return invalid(format!(
                "sample_rate_hz must be positive, got {}",
                self.acquisition.sample_rate_hz
            ));
        }
        if self.acquisition.channel_capacity == 0 {
            return invalid("channel_capacity must be at least 1".to_string());
        }
        if !(self.history.window_secs > 0.0) {
            return invalid(format!(
                "window_secs must be positive, got {}",
                self.history.window_secs
            ));
        }
        if self.beat.refractory_secs < 0.0 {
            return invalid(format!(
                "refractory_secs must not be negative, got {}",
                self.beat.refractory_secs
            ));
        }
        if self.bpm.window_capacity == 0 {
            return invalid("bpm window_capacity must be at least 1".to_string());
        }
        if self.bpm.min_bpm >= self.bpm.max_bpm {
            return invalid(format!(
                "bpm range ({}, {}) is empty",
                self.bpm.min_bpm, self.bpm.max_bpm
            ));
        }
        if self.filter.mode == FilterMode::Cascade {
            crate::processing::filters::SignalFilter::from_config(
                &self.filter,
                self.acquisition.sample_rate_hz,
            )
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let config_str = fs::read_to_string(path).map_err(ConfigError::Read)?;

    let config: Config = serde_yaml::from_str(&config_str)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<(), ConfigError> {
    let yaml = serde_yaml::to_string(config)?;

    fs::write(path, yaml).map_err(ConfigError::Write)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.history_capacity(), 2500);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = "
beat:
  threshold: 600
source:
  kind: simulated
  heart_rate_bpm: 72
  seed: 7
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.beat.threshold, 600.0);
        assert_eq!(config.beat.refractory_secs, 0.25);
        assert_eq!(config.bpm.window_capacity, 15);
        assert_eq!(
            config.source,
            SourceConfig::Simulated {
                heart_rate_bpm: 72.0,
                seed: Some(7)
            }
        );
    }

    #[test]
    fn device_baud_rate_defaults_to_9600() {
        let yaml = "
source:
  kind: device
  path: /dev/ttyACM0
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.source,
            SourceConfig::Device {
                path: PathBuf::from("/dev/ttyACM0"),
                baud_rate: 9600
            }
        );
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.yaml");

        let mut config = Config::default();
        config.acquisition.overflow_policy = OverflowPolicy::DropOldest;
        config.filter.mode = FilterMode::Identity;
        save_config(&config, &path).unwrap();

        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn rejects_notch_above_nyquist() {
        let mut config = Config::default();
        config.acquisition.sample_rate_hz = 80.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_empty_bpm_range() {
        let mut config = Config::default();
        config.bpm.min_bpm = 200.0;
        assert!(config.validate().is_err());
    }
}
