//! Ingestion service
//!
//! Validates incoming telemetry, admits log messages through the guard and
//! persists them, requesting notifications for severe or spamming sources.

use crate::error::ApiError;
use alerting::NotificationSink;
use chrono::Utc;
use data_validator::{ValidationError, Validator};
use guard::{Admission, AdmissionGuard};
use labeling::LabelEngine;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use storage::{
    CompilationStage, DataPoint, LogEntry, LogSeverity, Metric, MetricKey, MetricType,
    NewLogEntry, NotificationSeverity, Payload, Repository,
};
use tracing::{debug, error, warn};

/// Enumerated request field given either by name or by stable id
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnumField {
    Id(i64),
    Name(String),
}

impl EnumField {
    pub fn parse<T: FromStr>(
        &self,
        validator: &Validator,
        field: &'static str,
    ) -> Result<T, ValidationError> {
        match self {
            EnumField::Id(id) => validator.parse_field(field, &id.to_string()),
            EnumField::Name(name) => validator.parse_field(field, name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessageRequest {
    pub severity: EnumField,
    pub source: String,
    pub category: i32,
    pub message: String,
    #[serde(default)]
    pub auxiliary_data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpuLoadRequest {
    pub source: String,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationRequest {
    pub source: String,
    pub stage: EnumField,
    pub source_size: i64,
    /// Milliseconds
    pub compile_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserActionRequest {
    pub source: String,
    pub action: String,
    pub count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogDataRequest {
    pub source: String,
    pub severity: EnumField,
    pub count: i64,
}

pub struct IngestService {
    repository: Arc<dyn Repository>,
    guard: Arc<AdmissionGuard>,
    labels: Arc<LabelEngine>,
    notifications: Arc<dyn NotificationSink>,
    validator: Validator,
    log_severity_reported: LogSeverity,
}

impl IngestService {
    pub fn new(
        repository: Arc<dyn Repository>,
        guard: Arc<AdmissionGuard>,
        labels: Arc<LabelEngine>,
        notifications: Arc<dyn NotificationSink>,
        log_severity_reported: LogSeverity,
    ) -> Self {
        Self {
            repository,
            guard,
            labels,
            notifications,
            validator: Validator::default(),
            log_severity_reported,
        }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Validate, admit, persist, then request a High notification when the
    /// severity reaches the reporting threshold
    pub async fn ingest_log(&self, request: &LogMessageRequest) -> Result<LogEntry, ApiError> {
        let severity: LogSeverity = request.severity.parse(&self.validator, "severity")?;
        self.validator.validate_source(&request.source)?;
        self.validator.validate_message(&request.message)?;

        match self.guard.admit(&request.source) {
            Admission::Admitted => {}
            Admission::Rejected {
                retry_after,
                first_rejection,
            } => {
                if first_rejection {
                    let message = format!("{} is spamming logs", request.source);
                    warn!(source = %request.source, "{}", message);
                    self.request_notification(&message, NotificationSeverity::High)
                        .await;
                }
                let config = self.guard.config();
                return Err(ApiError::RateLimited {
                    requests: config.requests,
                    per_seconds: config.per_seconds,
                    retry_after,
                });
            }
        }

        let entry = self
            .repository
            .append_log(NewLogEntry {
                source: request.source.clone(),
                category: request.category,
                severity,
                message: request.message.clone(),
                auxiliary_data: request.auxiliary_data.clone(),
                timestamp: Utc::now(),
            })
            .await?;
        debug!(id = entry.id, source = %entry.source, severity = %severity, "Log message recorded");

        if severity >= self.log_severity_reported {
            let message = format!(
                "Log message of severity {} has been received from {}",
                severity, entry.source
            );
            self.request_notification(&message, NotificationSeverity::High)
                .await;
        }
        Ok(entry)
    }

    pub async fn ingest_cpu_load(&self, request: &CpuLoadRequest) -> Result<Metric, ApiError> {
        self.validator.validate_source(&request.source)?;
        self.validator.validate_cpu_load(request.value)?;
        self.record(
            MetricKey::new(MetricType::CpuLoad, request.source.clone()),
            Payload::Numeric {
                value: request.value,
            },
        )
        .await
    }

    pub async fn ingest_compilation(
        &self,
        request: &CompilationRequest,
    ) -> Result<Metric, ApiError> {
        self.validator.validate_source(&request.source)?;
        let stage: CompilationStage = request.stage.parse(&self.validator, "stage")?;
        let source_size = self
            .validator
            .validate_non_negative("sourceSize", request.source_size)?;
        let compile_time_ms = self
            .validator
            .validate_non_negative("compileTime", request.compile_time)?;
        self.record(
            MetricKey::new(MetricType::Compilation, request.source.clone()),
            Payload::Compilation {
                stage,
                source_size,
                compile_time_ms,
            },
        )
        .await
    }

    pub async fn ingest_user_action(
        &self,
        request: &UserActionRequest,
    ) -> Result<Metric, ApiError> {
        self.validator.validate_source(&request.source)?;
        if request.action.trim().is_empty() {
            return Err(ValidationError::MissingField("action").into());
        }
        let count = self.validator.validate_count("count", request.count)?;
        self.record(
            MetricKey::new(MetricType::UserAction, request.source.clone()),
            Payload::UserAction {
                action: request.action.trim().to_string(),
                count,
            },
        )
        .await
    }

    pub async fn ingest_log_data(&self, request: &LogDataRequest) -> Result<Metric, ApiError> {
        self.validator.validate_source(&request.source)?;
        let severity: LogSeverity = request.severity.parse(&self.validator, "severity")?;
        let count = self.validator.validate_count("count", request.count)?;
        self.record(
            MetricKey::new(MetricType::Log, request.source.clone()),
            Payload::Log { severity, count },
        )
        .await
    }

    /// Appends a point, creating the metric on first use, and refreshes its label
    async fn record(&self, key: MetricKey, payload: Payload) -> Result<Metric, ApiError> {
        let metric = self
            .repository
            .append_point(&key, DataPoint::new(Utc::now(), payload))
            .await?;
        let label = self.labels.refresh(self.repository.as_ref(), &metric).await?;
        debug!(metric = %key, label = %label, "Data point recorded");
        Ok(Metric {
            auto_label: label,
            ..metric
        })
    }

    /// Notification requests never fail the triggering request
    async fn request_notification(&self, message: &str, severity: NotificationSeverity) {
        match self.notifications.notify(message, severity).await {
            Ok(true) => {}
            Ok(false) => debug!(severity = %severity, "Notification throttled: {}", message),
            Err(e) => error!(severity = %severity, "Failed to request notification: {}", e),
        }
    }
}
