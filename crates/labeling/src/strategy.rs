//! Label strategies, one per metric type

use storage::{AutoLabel, DataPoint};

/// Labelling policy. `recent` is always newest first.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelStrategy {
    /// Average of the latest `samples` values against two thresholds
    CpuThreshold {
        samples: usize,
        warning: f64,
        critical: f64,
    },
    /// Failures among the latest `window` pings
    PingFailures { window: usize, max_failures: usize },
    /// Streams without a health notion are always Normal
    Passive,
}

impl LabelStrategy {
    /// How many of the latest points the strategy needs
    pub fn sample_size(&self) -> usize {
        match self {
            LabelStrategy::CpuThreshold { samples, .. } => *samples,
            LabelStrategy::PingFailures {
                window,
                max_failures,
            } => (*window).max(*max_failures),
            LabelStrategy::Passive => 0,
        }
    }

    pub fn evaluate(&self, recent: &[DataPoint]) -> AutoLabel {
        match self {
            LabelStrategy::CpuThreshold {
                samples,
                warning,
                critical,
            } => {
                if *samples == 0 || recent.len() < *samples {
                    return AutoLabel::Normal;
                }
                let values: Vec<f64> = recent
                    .iter()
                    .take(*samples)
                    .filter_map(DataPoint::value)
                    .collect();
                if values.is_empty() {
                    return AutoLabel::Normal;
                }
                let average = values.iter().sum::<f64>() / values.len() as f64;
                if average >= *critical {
                    AutoLabel::Critical
                } else if average >= *warning {
                    AutoLabel::Warning
                } else {
                    AutoLabel::Normal
                }
            }
            LabelStrategy::PingFailures {
                window,
                max_failures,
            } => {
                if recent.len() < self.sample_size() {
                    return AutoLabel::Normal;
                }
                let failures = recent
                    .iter()
                    .take(*window)
                    .filter(|p| p.is_failure())
                    .count();
                if failures >= *max_failures {
                    AutoLabel::Critical
                } else if recent.first().map_or(false, DataPoint::is_failure) {
                    AutoLabel::Warning
                } else {
                    AutoLabel::Normal
                }
            }
            LabelStrategy::Passive => AutoLabel::Normal,
        }
    }
}
