//! Metric administration and read endpoints

use crate::error::{ApiError, ApiJson, ApiQuery};
use crate::ingest::EnumField;
use crate::routes::list_or_no_content;
use crate::AppState;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use data_validator::{ValidationError, Validator};
use labeling::{uptime_percentage, DisplayLabel, MetricSummary};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use storage::{
    AutoLabel, DataPoint, ManualLabel, Metric, MetricFilter, MetricKey, MetricType, Payload,
};
use tracing::info;

const DEFAULT_TIMEPERIOD_SECS: u64 = 30 * 24 * 3_600;

#[derive(Debug, Deserialize)]
pub struct MetricIdentity {
    #[serde(rename = "type")]
    pub metric_type: EnumField,
    pub source: String,
}

impl MetricIdentity {
    fn key(&self, validator: &Validator) -> Result<MetricKey, ValidationError> {
        let metric_type: MetricType = self.metric_type.parse(validator, "type")?;
        validator.validate_source(&self.source)?;
        Ok(MetricKey::new(metric_type, self.source.clone()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricUpdateRequest {
    #[serde(flatten)]
    pub metric: MetricIdentity,
    pub manual_label_id: i64,
    pub public: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricView {
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub source: String,
    pub title: String,
    pub label: DisplayLabel,
    pub auto_label: AutoLabel,
    pub manual_label: ManualLabel,
    pub public: bool,
    pub last_updated: DateTime<Utc>,
    pub summary: MetricSummary,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
    pub source: Option<String>,
    /// Seconds of history to return
    pub timeperiod: Option<u64>,
}

pub async fn remove_metric(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<MetricIdentity>,
) -> Result<&'static str, ApiError> {
    let key = request.key(state.ingest.validator())?;
    if state.repository.remove_metric(&key).await? {
        info!(metric = %key, "Metric removed");
        Ok("Metric has been removed.")
    } else {
        Err(not_found(&key))
    }
}

pub async fn update_metric(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<MetricUpdateRequest>,
) -> Result<&'static str, ApiError> {
    let key = request.metric.key(state.ingest.validator())?;
    let metric = state
        .repository
        .find_metric(&key)
        .await?
        .ok_or_else(|| not_found(&key))?;
    let label = ManualLabel::from_id(request.manual_label_id).map_err(|_| {
        ApiError::NotFound(format!(
            "Manual label with id {} is not found",
            request.manual_label_id
        ))
    })?;

    let updated = state
        .repository
        .update_metric(&key, label, request.public)
        .await?;
    info!(
        metric = %key,
        manual_label = %label,
        public = updated.public,
        "Metric updated"
    );

    // A cleared override lets the auto label catch up under the suppress policy
    if metric.manual_label.is_set() && !label.is_set() {
        state
            .labels
            .refresh(state.repository.as_ref(), &updated)
            .await?;
    }
    Ok("Metric manual label has been updated.")
}

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<MetricsQuery>,
) -> Result<Response, ApiError> {
    let validator = state.ingest.validator();
    let filter = MetricFilter {
        metric_type: query
            .metric_type
            .as_deref()
            .map(|t| validator.parse_field("type", t))
            .transpose()?,
        source: query.source.filter(|s| !s.trim().is_empty()),
        public_only: false,
    };

    let now = Utc::now();
    let mut views = Vec::new();
    for metric in state.repository.list_metrics(&filter).await? {
        views.push(view(&state, metric, now).await?);
    }
    list_or_no_content(views)
}

/// Labels are computed from the stored points at read time
async fn view(state: &AppState, metric: Metric, now: DateTime<Utc>) -> Result<MetricView, ApiError> {
    let key = metric.key();
    let samples = state.labels.sample_size(metric.metric_type);
    let recent = state.repository.latest_points(&key, samples.max(1)).await?;
    let auto_label = if state.labels.should_recompute(&metric) {
        state.labels.evaluate(metric.metric_type, &recent)
    } else {
        metric.auto_label
    };

    let day = state
        .repository
        .points_since(&key, now - Duration::days(1))
        .await?;
    let mut summary = MetricSummary::compute(&day, now);
    if summary.current.is_none() {
        summary.current = recent.first().and_then(DataPoint::value);
    }

    let metric = Metric {
        auto_label,
        ..metric
    };
    Ok(MetricView {
        label: state.labels.display_label(&metric),
        metric_type: metric.metric_type,
        source: metric.source,
        title: metric.title,
        auto_label,
        manual_label: metric.manual_label,
        public: metric.public,
        last_updated: metric.last_updated,
        summary,
    })
}

pub async fn get_data(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<DataQuery>,
) -> Result<Response, ApiError> {
    let validator = state.ingest.validator();
    let metric_type: MetricType =
        validator.parse_field("type", query.metric_type.as_deref().unwrap_or_default())?;
    let source = query.source.unwrap_or_default();
    validator.validate_source(&source)?;
    let key = MetricKey::new(metric_type, source);

    if state.repository.find_metric(&key).await?.is_none() {
        return Err(not_found(&key));
    }

    let period = query.timeperiod.unwrap_or(DEFAULT_TIMEPERIOD_SECS);
    let period = Duration::seconds(i64::try_from(period).unwrap_or(i64::MAX).min(i64::MAX / 1000));
    let since = Utc::now()
        .checked_sub_signed(period)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut points = state.repository.points_since(&key, since).await?;
    points.reverse();
    list_or_no_content(points.iter().map(point_json).collect())
}

#[derive(Debug, Default, Deserialize)]
pub struct UptimeQuery {
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UptimeView {
    pub source: String,
    /// Share of successful pings over the stored history (%)
    pub uptime: u8,
}

pub async fn get_uptime(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<UptimeQuery>,
) -> Result<Json<UptimeView>, ApiError> {
    let source = query.source.unwrap_or_default();
    state.ingest.validator().validate_source(&source)?;
    let key = MetricKey::new(MetricType::Ping, source);
    if state.repository.find_metric(&key).await?.is_none() {
        return Err(not_found(&key));
    }

    let points = state
        .repository
        .points_since(&key, DateTime::<Utc>::MIN_UTC)
        .await?;
    Ok(Json(UptimeView {
        uptime: uptime_percentage(&points),
        source: key.source,
    }))
}

fn not_found(key: &MetricKey) -> ApiError {
    ApiError::NotFound(format!(
        "Metric of type {} and source {} is not found",
        key.metric_type, key.source
    ))
}

/// Public fields of a data point
fn point_json(point: &DataPoint) -> Value {
    let timestamp = point.timestamp;
    match &point.payload {
        Payload::Numeric { value } => json!({ "timestamp": timestamp, "value": value }),
        Payload::Log { severity, count } => {
            json!({ "timestamp": timestamp, "severity": severity, "count": count })
        }
        Payload::Compilation {
            stage,
            source_size,
            compile_time_ms,
        } => json!({
            "timestamp": timestamp,
            "stage": stage,
            "sourceSize": source_size,
            "compileTime": compile_time_ms,
        }),
        Payload::Ping {
            latency_ms,
            success,
            message,
        } => json!({
            "timestamp": timestamp,
            "responseTime": latency_ms,
            "success": success,
            "message": message,
        }),
        Payload::UserAction { action, count } => {
            json!({ "timestamp": timestamp, "action": action, "count": count })
        }
        Payload::Health { health } => json!({ "timestamp": timestamp, "health": health }),
    }
}
