//! Notification Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use storage::NotificationSeverity;

/// Minimum seconds between two accepted notifications of the same severity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frequencies {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

impl Frequencies {
    pub fn for_severity(&self, severity: NotificationSeverity) -> Duration {
        Duration::from_secs(match severity {
            NotificationSeverity::Low => self.low,
            NotificationSeverity::Medium => self.medium,
            NotificationSeverity::High => self.high,
        })
    }
}

impl Default for Frequencies {
    fn default() -> Self {
        Self {
            low: 86_400,
            medium: 3_600,
            high: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub frequencies: Frequencies,
    /// Upper bound on a single transport send (seconds)
    pub send_timeout_secs: u64,
}

impl NotificationConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            frequencies: Frequencies::default(),
            send_timeout_secs: 10,
        }
    }
}
