//! Status Monitor API Server
//!
//! HTTP surface for telemetry ingestion, metric administration and health
//! reporting, plus the wiring that assembles the background services.

mod app;
mod error;
mod ingest;
mod routes;
mod settings;
pub mod telemetry;

pub use app::App;
pub use error::{ApiError, ApiJson, ApiQuery};
pub use ingest::{
    CompilationRequest, CpuLoadRequest, EnumField, IngestService, LogDataRequest,
    LogMessageRequest, UserActionRequest,
};
pub use settings::{ConfigError, Settings};

use axum::routing::{delete, get, patch, post};
use axum::Router;
use labeling::LabelEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use storage::Repository;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub ingest: Arc<IngestService>,
    pub labels: Arc<LabelEngine>,
    pub prometheus: Option<PrometheusHandle>,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/logmessage", post(routes::ingest::log_message))
        .route("/api/cpuload", post(routes::ingest::cpu_load))
        .route("/api/compilation", post(routes::ingest::compilation))
        .route("/api/useraction", post(routes::ingest::user_action))
        .route("/api/logdata", post(routes::ingest::log_data))
        .route("/api/removemetric", delete(routes::metrics::remove_metric))
        .route("/api/metricupdate", patch(routes::metrics::update_metric))
        .route("/api/getmetrics", get(routes::metrics::get_metrics))
        .route("/api/getdata", get(routes::metrics::get_data))
        .route("/api/uptime", get(routes::metrics::get_uptime))
        .route("/api/getlogmessages", get(routes::status::get_log_messages))
        .route("/api/health", get(routes::status::health))
        .route("/api/badge", get(routes::status::badge))
        .route("/api/discrepancies", get(routes::status::discrepancies))
        .route("/metrics", get(routes::status::prometheus))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
