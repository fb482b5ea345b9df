//! Label Engine
//!
//! Derives an auto-label from a metric's latest data points, summarises
//! recent values, rolls public labels up into a health report and computes
//! ping uptime.

mod config;
mod engine;
mod health;
mod strategy;
mod summary;

pub use config::{LabelConfig, ManualOverridePolicy};
pub use engine::{DisplayLabel, LabelEngine};
pub use health::{
    health_percentage, system_health_key, uptime_percentage, Badge, BadgeStatus, HealthEntry,
    HealthReport, SYSTEM_HEALTH_SOURCE,
};
pub use strategy::LabelStrategy;
pub use summary::{MetricSummary, WindowStats};
