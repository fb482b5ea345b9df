//! Log queries, health, badge and discrepancy history

use crate::error::{ApiError, ApiQuery};
use crate::routes::list_or_no_content;
use crate::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, TimeZone, Utc};
use data_validator::ValidationError;
use labeling::{Badge, HealthReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{Discrepancy, DiscrepancyType, LogEntry, LogFilter, LogSeverity, MetricFilter, MetricType};

const MAX_LOG_RESULTS: usize = 1_000;

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub sources: Option<String>,
    pub categories: Option<String>,
    pub severities: Option<String>,
    pub keywords: Option<String>,
    /// Epoch milliseconds
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryView {
    pub id: i64,
    pub source: String,
    pub category: i32,
    pub severity: LogSeverity,
    pub message: String,
    pub auxiliary_data: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<LogEntry> for LogEntryView {
    fn from(entry: LogEntry) -> Self {
        Self {
            id: entry.id,
            source: entry.source,
            category: entry.category,
            severity: entry.severity,
            message: entry.message,
            auxiliary_data: entry.auxiliary_data,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscrepancyView {
    pub id: i64,
    #[serde(rename = "type")]
    pub discrepancy_type: DiscrepancyType,
    pub metric_type: MetricType,
    pub metric_source: String,
    pub date_first_offense: DateTime<Utc>,
    pub resolved: bool,
    pub date_resolved: Option<DateTime<Utc>>,
}

impl From<Discrepancy> for DiscrepancyView {
    fn from(d: Discrepancy) -> Self {
        Self {
            id: d.id,
            discrepancy_type: d.discrepancy_type,
            metric_type: d.metric_type,
            metric_source: d.metric_source,
            date_first_offense: d.date_first_offense,
            resolved: d.resolved,
            date_resolved: d.date_resolved,
        }
    }
}

fn epoch_ms(field: &'static str, ms: i64) -> Result<DateTime<Utc>, ValidationError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ValidationError::UnknownValue {
            field,
            value: ms.to_string(),
        })
}

pub async fn get_log_messages(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> Result<Response, ApiError> {
    let validator = state.ingest.validator();
    let filter = LogFilter {
        sources: validator.parse_list("sources", query.sources.as_deref())?,
        categories: validator.parse_list("categories", query.categories.as_deref())?,
        severities: validator.parse_list("severities", query.severities.as_deref())?,
        keywords: validator.parse_list("keywords", query.keywords.as_deref())?,
        start: query.start.map(|ms| epoch_ms("start", ms)).transpose()?,
        end: query.end.map(|ms| epoch_ms("end", ms)).transpose()?,
        limit: Some(query.limit.unwrap_or(MAX_LOG_RESULTS).min(MAX_LOG_RESULTS)),
    };

    let entries = state.repository.query_logs(&filter).await?;
    list_or_no_content(entries.into_iter().map(LogEntryView::from).collect())
}

async fn health_report(state: &AppState) -> Result<HealthReport, ApiError> {
    let metrics = state
        .repository
        .list_metrics(&MetricFilter {
            public_only: true,
            ..Default::default()
        })
        .await?;
    Ok(HealthReport::from_metrics(&metrics))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthReport>, ApiError> {
    Ok(Json(health_report(&state).await?))
}

pub async fn badge(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let report = health_report(&state).await?;
    let svg = Badge::health(report.health).render_svg();
    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        svg,
    )
        .into_response())
}

pub async fn discrepancies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DiscrepancyView>>, ApiError> {
    let records = state.repository.discrepancies().await?;
    Ok(Json(records.into_iter().map(DiscrepancyView::from).collect()))
}

pub async fn prometheus(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}
