//! Write endpoints

use crate::error::{ApiError, ApiJson};
use crate::ingest::{
    CompilationRequest, CpuLoadRequest, LogDataRequest, LogMessageRequest, UserActionRequest,
};
use crate::AppState;
use axum::extract::State;
use std::sync::Arc;

pub async fn log_message(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LogMessageRequest>,
) -> Result<&'static str, ApiError> {
    state.ingest.ingest_log(&request).await?;
    Ok("Log message has been recorded.")
}

pub async fn cpu_load(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CpuLoadRequest>,
) -> Result<&'static str, ApiError> {
    state.ingest.ingest_cpu_load(&request).await?;
    Ok("Data point has been recorded.")
}

pub async fn compilation(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CompilationRequest>,
) -> Result<&'static str, ApiError> {
    state.ingest.ingest_compilation(&request).await?;
    Ok("Data point has been recorded.")
}

pub async fn user_action(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<UserActionRequest>,
) -> Result<&'static str, ApiError> {
    state.ingest.ingest_user_action(&request).await?;
    Ok("Data point has been recorded.")
}

pub async fn log_data(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LogDataRequest>,
) -> Result<&'static str, ApiError> {
    state.ingest.ingest_log_data(&request).await?;
    Ok("Data point has been recorded.")
}
