//! Detector Configuration

use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapConfig {
    /// Seconds without data after which a gap is recorded
    pub max_difference: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// CPU load at or above which a sample counts as high (%)
    pub threshold: f64,
    /// High samples in a row tolerated before a spike is recorded
    pub max_failures: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingFailureConfig {
    /// Failed pings in a row tolerated before a discrepancy is recorded
    pub max_failures: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Health below which a snapshot counts as low (%)
    pub threshold: u8,
    /// Low snapshots in a row tolerated before a discrepancy is recorded
    pub max_failures: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Window every check scans (seconds)
    pub data_timeframe: u64,
    pub gaps: GapConfig,
    pub load: LoadConfig,
    pub ping: PingFailureConfig,
    pub health: HealthConfig,
}

fn clamp_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000)
}

impl DetectorConfig {
    pub fn data_timeframe(&self) -> Duration {
        Duration::seconds(clamp_secs(self.data_timeframe))
    }

    pub fn max_difference(&self) -> Duration {
        Duration::seconds(clamp_secs(self.gaps.max_difference))
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            data_timeframe: 1_800,
            gaps: GapConfig {
                max_difference: 300,
            },
            load: LoadConfig {
                threshold: 90.0,
                max_failures: 5,
            },
            ping: PingFailureConfig { max_failures: 3 },
            health: HealthConfig {
                threshold: 70,
                max_failures: 3,
            },
        }
    }
}
