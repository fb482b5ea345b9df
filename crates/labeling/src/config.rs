//! Label Engine Configuration

use serde::{Deserialize, Serialize};

/// How an operator-set manual label interacts with auto-labelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualOverridePolicy {
    /// Auto labels keep being recomputed; the manual label only wins for display
    #[default]
    DisplayOnly,
    /// While a manual label is set the stored auto label is frozen
    SuppressAuto,
}

/// Thresholds for the per-type strategies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Number of latest CPU samples averaged
    pub cpu_samples: usize,
    /// Average CPU load at which a metric becomes Warning (%)
    pub cpu_warning: f64,
    /// Average CPU load at which a metric becomes Critical (%)
    pub cpu_critical: f64,
    /// Number of latest pings inspected
    pub ping_window: usize,
    /// Failures within the ping window that make a metric Critical
    pub ping_max_failures: usize,
    pub manual_override: ManualOverridePolicy,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            cpu_samples: 5,
            cpu_warning: 50.0,
            cpu_critical: 90.0,
            ping_window: 10,
            ping_max_failures: 3,
            manual_override: ManualOverridePolicy::DisplayOnly,
        }
    }
}
