//! Background services run by the manager

mod clean;
mod discrepancy;
mod health;
mod notification;
mod ping;

pub use clean::{CleanReport, CleanService};
pub use discrepancy::DiscrepancyTask;
pub use health::HealthService;
pub use notification::NotificationTask;
pub use ping::PingService;
