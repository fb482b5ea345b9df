//! Discrepancy Detector
//!
//! Scans the recent window of every metric stream for data gaps, load spikes,
//! repeated failures and low system health. Each offense is recorded once
//! under its first-offense time and resolved when later data shows it ended.

mod checks;
mod config;
mod detector;
mod message;

pub use checks::{find_gaps, find_runs, Findings, Offense};
pub use config::{DetectorConfig, GapConfig, HealthConfig, LoadConfig, PingFailureConfig};
pub use detector::{checks_for, severity_for, CheckState, DetectorError, DiscrepancyDetector, ScanReport};
pub use message::describe;
