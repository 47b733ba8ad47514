//! Configuration types for position acquisition and track recording
//!
//! This module provides configuration structures for the acquisition
//! cascade (timeouts, cache ages, the GPS-like accuracy threshold) and for
//! the track recorder (buffer cap, flush interval, watch options).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use trailfix_core::{RegionPolicy, DEFAULT_GPS_ACCURACY_THRESHOLD_M};

use crate::error::{Result, TrackingError};
use crate::provider::AcquireOptions;

/// Default timeout for a one-shot device sensor read
pub const DEFAULT_PRIMARY_TIMEOUT_MS: u64 = 15_000;

/// Default maximum age of a cached device reading
pub const DEFAULT_PRIMARY_MAX_AGE_MS: u64 = 60_000;

/// Default timeout for the secondary provider
pub const DEFAULT_SECONDARY_TIMEOUT_MS: u64 = 10_000;

/// Default timeout for a forced (uncached) read
pub const DEFAULT_FORCED_TIMEOUT_MS: u64 = 30_000;

/// Default timeout passed to the continuous watch
pub const DEFAULT_WATCH_TIMEOUT_MS: u64 = 10_000;

/// Default number of samples kept in memory
pub const DEFAULT_MAX_SAMPLES: usize = 1000;

/// Default interval between automatic flushes
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;

/// Main configuration for the tracking pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Acquisition cascade settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Track recorder settings
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl TrackingConfig {
    /// Check values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if self.recorder.max_samples == 0 {
            return Err(TrackingError::InvalidConfig(
                "recorder.max_samples must be at least 1".to_string(),
            ));
        }
        if self.recorder.flush_interval.is_zero() {
            return Err(TrackingError::InvalidConfig(
                "recorder.flush_interval must be non-zero".to_string(),
            ));
        }
        if !self.source.gps_accuracy_threshold_m.is_finite()
            || self.source.gps_accuracy_threshold_m <= 0.0
        {
            return Err(TrackingError::InvalidConfig(format!(
                "source.gps_accuracy_threshold_m must be positive, got {}",
                self.source.gps_accuracy_threshold_m
            )));
        }
        Ok(())
    }
}

/// Acquisition cascade configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Timeout for the device sensor read
    #[serde(with = "humantime_serde", default = "default_primary_timeout")]
    pub primary_timeout: Duration,

    /// Maximum age of a cached device reading the sensor may return
    #[serde(with = "humantime_serde", default = "default_primary_max_age")]
    pub primary_maximum_age: Duration,

    /// Timeout for the secondary provider
    #[serde(with = "humantime_serde", default = "default_secondary_timeout")]
    pub secondary_timeout: Duration,

    /// Timeout for the forced (diagnostic) read
    #[serde(with = "humantime_serde", default = "default_forced_timeout")]
    pub forced_timeout: Duration,

    /// Accuracy below which a fix is classified GPS-like
    #[serde(default = "default_gps_threshold")]
    pub gps_accuracy_threshold_m: f64,

    /// Where the GCJ02 correction applies
    #[serde(default)]
    pub region_policy: RegionPolicy,
}

fn default_primary_timeout() -> Duration {
    Duration::from_millis(DEFAULT_PRIMARY_TIMEOUT_MS)
}

fn default_primary_max_age() -> Duration {
    Duration::from_millis(DEFAULT_PRIMARY_MAX_AGE_MS)
}

fn default_secondary_timeout() -> Duration {
    Duration::from_millis(DEFAULT_SECONDARY_TIMEOUT_MS)
}

fn default_forced_timeout() -> Duration {
    Duration::from_millis(DEFAULT_FORCED_TIMEOUT_MS)
}

fn default_gps_threshold() -> f64 {
    DEFAULT_GPS_ACCURACY_THRESHOLD_M
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            primary_timeout: default_primary_timeout(),
            primary_maximum_age: default_primary_max_age(),
            secondary_timeout: default_secondary_timeout(),
            forced_timeout: default_forced_timeout(),
            gps_accuracy_threshold_m: DEFAULT_GPS_ACCURACY_THRESHOLD_M,
            region_policy: RegionPolicy::Always,
        }
    }
}

impl SourceConfig {
    /// Options for the regular device sensor read
    pub fn primary_options(&self) -> AcquireOptions {
        AcquireOptions {
            enable_high_accuracy: true,
            timeout: self.primary_timeout,
            maximum_age: self.primary_maximum_age,
        }
    }

    /// Options for the forced read: no cache, high accuracy, long timeout
    pub fn forced_options(&self) -> AcquireOptions {
        AcquireOptions {
            enable_high_accuracy: true,
            timeout: self.forced_timeout,
            maximum_age: Duration::ZERO,
        }
    }

    /// Options for the secondary provider
    pub fn secondary_options(&self) -> AcquireOptions {
        AcquireOptions {
            enable_high_accuracy: true,
            timeout: self.secondary_timeout,
            maximum_age: Duration::ZERO,
        }
    }
}

/// Track recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Maximum samples kept in memory before the oldest are dropped
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Interval between automatic flushes
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub flush_interval: Duration,

    /// Timeout passed to the continuous watch
    #[serde(with = "humantime_serde", default = "default_watch_timeout")]
    pub watch_timeout: Duration,

    /// Capacity of the channel between the provider and the sample pump
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_max_samples() -> usize {
    DEFAULT_MAX_SAMPLES
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS)
}

fn default_watch_timeout() -> Duration {
    Duration::from_millis(DEFAULT_WATCH_TIMEOUT_MS)
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MAX_SAMPLES,
            flush_interval: default_flush_interval(),
            watch_timeout: default_watch_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl RecorderConfig {
    /// Options for the continuous watch: high accuracy, never cached
    pub fn watch_options(&self) -> AcquireOptions {
        AcquireOptions {
            enable_high_accuracy: true,
            timeout: self.watch_timeout,
            maximum_age: Duration::ZERO,
        }
    }
}

/// Builder for TrackingConfig
#[derive(Debug, Default)]
pub struct TrackingConfigBuilder {
    config: TrackingConfig,
}

impl TrackingConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device sensor timeout
    pub fn primary_timeout(mut self, timeout: Duration) -> Self {
        self.config.source.primary_timeout = timeout;
        self
    }

    /// Set the secondary provider timeout
    pub fn secondary_timeout(mut self, timeout: Duration) -> Self {
        self.config.source.secondary_timeout = timeout;
        self
    }

    /// Set the forced read timeout
    pub fn forced_timeout(mut self, timeout: Duration) -> Self {
        self.config.source.forced_timeout = timeout;
        self
    }

    /// Set the GPS-like accuracy threshold
    pub fn gps_accuracy_threshold(mut self, meters: f64) -> Self {
        self.config.source.gps_accuracy_threshold_m = meters;
        self
    }

    /// Set the region policy for the datum transform
    pub fn region_policy(mut self, policy: RegionPolicy) -> Self {
        self.config.source.region_policy = policy;
        self
    }

    /// Set the sample buffer cap (at least 1)
    pub fn max_samples(mut self, max: usize) -> Self {
        self.config.recorder.max_samples = max.max(1);
        self
    }

    /// Set the automatic flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.recorder.flush_interval = interval;
        self
    }

    /// Build the configuration
    pub fn build(self) -> TrackingConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
