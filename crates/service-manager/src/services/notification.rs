use crate::task::PeriodicTask;
use alerting::Dispatcher;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Drains the notification queue. Periodic ticks retry failed deliveries;
/// wake-ups from the scheduler only send fresh notifications.
pub struct NotificationTask {
    dispatcher: Arc<Dispatcher>,
    wake: Arc<Notify>,
}

impl NotificationTask {
    pub fn new(dispatcher: Arc<Dispatcher>, wake: Arc<Notify>) -> Self {
        Self { dispatcher, wake }
    }

    async fn drain(&self, fresh_only: bool) -> anyhow::Result<()> {
        let report = self.dispatcher.process_queue(fresh_only).await?;
        if report.sent > 0 || report.failed > 0 {
            debug!(sent = report.sent, failed = report.failed, fresh_only, "Notification pass finished");
        }
        Ok(())
    }
}

#[async_trait]
impl PeriodicTask for NotificationTask {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.drain(false).await
    }

    fn wake_signal(&self) -> Option<Arc<Notify>> {
        Some(Arc::clone(&self.wake))
    }

    async fn on_wake(&self) -> anyhow::Result<()> {
        self.drain(true).await
    }
}
