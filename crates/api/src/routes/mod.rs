//! HTTP routes

pub mod ingest;
pub mod metrics;
pub mod status;

use crate::error::ApiError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// 200 with the JSON list, or 204 when there is nothing to return
pub(crate) fn list_or_no_content<T: Serialize>(items: Vec<T>) -> Result<Response, ApiError> {
    if items.is_empty() {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(Json(items).into_response())
    }
}
