//! Service configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether a service runs and how often
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSchedule {
    pub enabled: bool,
    /// Seconds between runs
    pub interval: u64,
}

impl ServiceSchedule {
    pub fn new(enabled: bool, interval: u64) -> Self {
        Self { enabled, interval }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

impl Default for ServiceSchedule {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 60,
        }
    }
}

/// A server probed by the ping service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingTarget {
    pub url: String,
    /// Milliseconds before a probe counts as failed
    #[serde(default = "default_max_response_time")]
    pub max_response_time: u64,
    /// Send GET instead of HEAD
    #[serde(default)]
    pub get_method_required: bool,
}

fn default_max_response_time() -> u64 {
    3_000
}

impl PingTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_response_time: default_max_response_time(),
            get_method_required: false,
        }
    }

    pub fn max_response_time(&self) -> Duration {
        Duration::from_millis(self.max_response_time)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingConfig {
    #[serde(default)]
    pub targets: Vec<PingTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Seconds of history to keep
    pub max_age: u64,
}

impl CleanConfig {
    pub fn max_age(&self) -> chrono::Duration {
        let secs = i64::try_from(self.max_age).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        chrono::Duration::seconds(secs)
    }
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            max_age: 30 * 24 * 3_600,
        }
    }
}
