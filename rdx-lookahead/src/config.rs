//! Defines the configuration for the lookahead `Scheduler`.
//!
//! The struct is designed to be deserialized with `serde`, so the scheduler's
//! polling period and window sizes can live in a TOML file or the environment
//! instead of application code. Every field has a default, so an empty source
//! yields the stock configuration.

use crate::error::{Result, SchedulerError};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default timer polling period, in seconds.
pub const DEFAULT_INTERVAL: f64 = 0.025;
/// Default lookahead window width, in seconds.
pub const DEFAULT_AHEAD_TIME: f64 = 0.1;
/// Default forward bias applied to dispatched playback times, in seconds.
pub const DEFAULT_OFFSET_TIME: f64 = 0.005;

/// Prefix for environment overrides, e.g. `LOOKAHEAD_AHEAD_TIME=0.2`.
pub const ENV_PREFIX: &str = "LOOKAHEAD";

/// Construction-time settings of a `Scheduler`. Immutable once built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchedulerConfig {
    /// How often the timer fires, in seconds.
    #[serde(default = "default_interval")]
    pub interval: f64,

    /// Width of the lookahead window `[t0, t0 + ahead_time)`, in seconds.
    #[serde(default = "default_ahead_time")]
    pub ahead_time: f64,

    /// Added to every dispatch playback time to absorb downstream latency.
    #[serde(default = "default_offset_time")]
    pub offset_time: f64,
}

impl SchedulerConfig {
    /// Loads the configuration from an optional TOML file, then applies
    /// `LOOKAHEAD_*` environment overrides, then validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let config: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value can drive a timer and order events.
    pub fn validate(&self) -> Result<()> {
        if !self.interval.is_finite() || self.interval <= 0.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "interval must be a positive number of seconds, got {}",
                self.interval
            )));
        }
        if !self.ahead_time.is_finite() || self.ahead_time < 0.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "ahead_time must be a non-negative number of seconds, got {}",
                self.ahead_time
            )));
        }
        if !self.offset_time.is_finite() {
            return Err(SchedulerError::InvalidConfig(format!(
                "offset_time must be finite, got {}",
                self.offset_time
            )));
        }
        Ok(())
    }

    /// The polling period as a `Duration`, for arming the timer.
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.interval)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            ahead_time: default_ahead_time(),
            offset_time: default_offset_time(),
        }
    }
}

// --- Default value functions for serde ---

fn default_interval() -> f64 {
    DEFAULT_INTERVAL
}

fn default_ahead_time() -> f64 {
    DEFAULT_AHEAD_TIME
}

fn default_offset_time() -> f64 {
    DEFAULT_OFFSET_TIME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_timing() {
        let config = SchedulerConfig::default();
        assert_eq!(config.interval, 0.025);
        assert_eq!(config.ahead_time, 0.1);
        assert_eq!(config.offset_time, 0.005);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = SchedulerConfig::from_toml_str("ahead_time = 0.25\n").unwrap();
        assert_eq!(config.ahead_time, 0.25);
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(config.offset_time, DEFAULT_OFFSET_TIME);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = SchedulerConfig::from_toml_str("interval = 0.0\n").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    }

    #[test]
    fn negative_ahead_time_is_rejected() {
        let config = SchedulerConfig {
            ahead_time: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn malformed_toml_surfaces_a_config_error() {
        let err = SchedulerConfig::from_toml_str("interval = [").unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
    }

    #[test]
    fn interval_converts_to_duration() {
        let config = SchedulerConfig::default();
        assert_eq!(config.interval_duration(), Duration::from_millis(25));
    }
}
