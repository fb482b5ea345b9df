//! Queue processing and delivery

use crate::config::NotificationConfig;
use crate::transport::Transport;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use storage::{DeliveryOutcome, Notification, Repository, StorageError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Outcome counts for one pass over the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

/// Text handed to the transport
pub fn format_message(notification: &Notification) -> String {
    format!(
        "[{}] {}: {}",
        notification
            .date_created
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        notification.severity,
        notification.message
    )
}

/// Delivers queued notifications. Failed sends stay unsent for the next tick.
pub struct Dispatcher {
    repository: Arc<dyn Repository>,
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
    /// Serialises passes so a notification is never sent twice concurrently
    pass: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        repository: Arc<dyn Repository>,
        transport: Arc<dyn Transport>,
        config: &NotificationConfig,
    ) -> Self {
        info!(transport = transport.name(), "Creating notification dispatcher");
        Self {
            repository,
            transport,
            send_timeout: config.send_timeout(),
            pass: Mutex::new(()),
        }
    }

    /// Sends pending notifications. With `fresh_only` (a wake-up), notifications
    /// that already failed once are left for the periodic pass.
    pub async fn process_queue(&self, fresh_only: bool) -> Result<DispatchReport, StorageError> {
        let _pass = self.pass.lock().await;
        let pending = self.repository.pending_notifications(fresh_only).await?;
        let mut report = DispatchReport::default();

        if pending.is_empty() {
            return Ok(report);
        }
        debug!(pending = pending.len(), fresh_only, "Processing notification queue");

        for notification in pending {
            let text = format_message(&notification);
            let outcome = match tokio::time::timeout(
                self.send_timeout,
                self.transport.send(&text, notification.severity),
            )
            .await
            {
                Ok(Ok(())) => DeliveryOutcome::Sent { at: Utc::now() },
                Ok(Err(e)) => {
                    warn!(id = notification.id, attempts = notification.attempts + 1, "Delivery failed: {}", e);
                    DeliveryOutcome::Failed
                }
                Err(_) => {
                    warn!(id = notification.id, attempts = notification.attempts + 1, "Delivery timed out");
                    DeliveryOutcome::Failed
                }
            };

            // Skip the record on storage errors; it is picked up again next tick
            if let Err(e) = self.repository.record_delivery(notification.id, outcome).await {
                error!(id = notification.id, "Failed to record delivery: {}", e);
                continue;
            }

            match outcome {
                DeliveryOutcome::Sent { .. } => {
                    metrics::counter!("notifications_sent_total").increment(1);
                    report.sent += 1;
                }
                DeliveryOutcome::Failed => {
                    metrics::counter!("notifications_failed_total").increment(1);
                    report.failed += 1;
                }
            }
        }

        info!(sent = report.sent, failed = report.failed, "Notification queue processed");
        Ok(report)
    }
}
