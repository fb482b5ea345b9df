//! Outbound notification transports

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use storage::NotificationSeverity;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport timed out")]
    Timeout,
    #[error("Transport returned status {0}")]
    Status(u16),
    #[error("Transport request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// A delivery channel for formatted notification messages
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &str, severity: NotificationSeverity)
        -> Result<(), TransportError>;
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    text: &'a str,
}

/// Chat webhook (Slack-compatible `{"text": ...}` body)
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(
        &self,
        message: &str,
        _severity: NotificationSeverity,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookBody { text: message })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}

/// Records messages in the log instead of delivering them
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(
        &self,
        message: &str,
        severity: NotificationSeverity,
    ) -> Result<(), TransportError> {
        info!(severity = %severity, "Notification was supposed to be sent: {}", message);
        Ok(())
    }
}
