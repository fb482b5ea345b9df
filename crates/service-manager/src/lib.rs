//! Service Manager
//!
//! Runs each enabled background service on its own interval until shutdown
//! and provides the ping, health snapshot and cleanup services.

mod config;
mod manager;
mod services;
mod task;

pub use config::{CleanConfig, PingConfig, PingTarget, ServiceSchedule};
pub use manager::ServiceManager;
pub use services::{
    CleanReport, CleanService, DiscrepancyTask, HealthService, NotificationTask, PingService,
};
pub use task::PeriodicTask;
