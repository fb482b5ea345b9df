//! Periodic task abstraction

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;

/// A unit of background work run by the [`ServiceManager`](crate::ServiceManager)
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// One run of the service
    async fn tick(&self) -> anyhow::Result<()>;

    /// Optional signal that triggers `on_wake` between ticks
    fn wake_signal(&self) -> Option<Arc<Notify>> {
        None
    }

    async fn on_wake(&self) -> anyhow::Result<()> {
        self.tick().await
    }
}
