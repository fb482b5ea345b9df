//! Notification Scheduler
//!
//! Accepts notification requests, throttles them per severity tier, persists
//! the accepted ones and delivers them asynchronously through a transport.

mod config;
mod dispatcher;
mod scheduler;
mod throttle;
mod transport;

pub use config::{Frequencies, NotificationConfig};
pub use dispatcher::{format_message, DispatchReport, Dispatcher};
pub use scheduler::{NotificationScheduler, NotificationSink, NotifyError};
pub use throttle::SeverityThrottle;
pub use transport::{LogTransport, Transport, TransportError, WebhookTransport};
