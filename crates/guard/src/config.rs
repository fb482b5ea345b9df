//! Guard Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Admission limits applied to every source independently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Requests admitted per window
    pub requests: u32,
    /// Window length in seconds
    pub per_seconds: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            requests: 10,
            per_seconds: 60,
        }
    }
}

impl GuardConfig {
    pub fn new(requests: u32, per_seconds: u64) -> Self {
        Self {
            requests,
            per_seconds,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.per_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.requests, 10);
        assert_eq!(config.window(), Duration::from_secs(60));
    }
}
