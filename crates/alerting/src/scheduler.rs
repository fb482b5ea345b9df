//! Notification intake

use crate::config::NotificationConfig;
use crate::throttle::SeverityThrottle;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use storage::{NotificationSeverity, Repository, StorageError};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to persist notification: {0}")]
    Storage(#[from] StorageError),
}

/// Anything that accepts notification requests
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Returns true if the request passed throttling and was queued
    async fn notify(
        &self,
        message: &str,
        severity: NotificationSeverity,
    ) -> Result<bool, NotifyError>;
}

/// Throttles requests per severity and queues accepted ones for the dispatcher
pub struct NotificationScheduler {
    repository: Arc<dyn Repository>,
    throttle: SeverityThrottle,
    wake: Arc<Notify>,
}

impl NotificationScheduler {
    pub fn new(repository: Arc<dyn Repository>, config: &NotificationConfig) -> Self {
        info!(frequencies = ?config.frequencies, "Creating notification scheduler");
        Self {
            repository,
            throttle: SeverityThrottle::new(config.frequencies.clone()),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Signalled whenever a notification is queued
    pub fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub async fn schedule(
        &self,
        message: &str,
        severity: NotificationSeverity,
    ) -> Result<bool, NotifyError> {
        self.schedule_at(message, severity, Instant::now()).await
    }

    /// Throttle check at `now`, then persist and wake the dispatcher.
    /// A throttled request is dropped and reported as `Ok(false)`.
    pub async fn schedule_at(
        &self,
        message: &str,
        severity: NotificationSeverity,
        now: Instant,
    ) -> Result<bool, NotifyError> {
        if !self.throttle.try_acquire(severity, now) {
            metrics::counter!("notifications_throttled_total", "severity" => severity.as_str())
                .increment(1);
            return Ok(false);
        }

        match self
            .repository
            .insert_notification(severity, message, Utc::now())
            .await
        {
            Ok(notification) => {
                metrics::counter!("notifications_scheduled_total", "severity" => severity.as_str())
                    .increment(1);
                info!(
                    id = notification.id,
                    severity = %severity,
                    "Notification scheduled: {}", message
                );
                self.wake.notify_one();
                Ok(true)
            }
            Err(e) => {
                self.throttle.release(severity, now);
                error!(severity = %severity, "Failed to schedule notification: {}", e);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl NotificationSink for NotificationScheduler {
    async fn notify(
        &self,
        message: &str,
        severity: NotificationSeverity,
    ) -> Result<bool, NotifyError> {
        self.schedule(message, severity).await
    }
}
