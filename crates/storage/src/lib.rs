//! Storage Layer
//!
//! Records for metrics, data points, log entries, notifications and
//! discrepancies, behind a `Repository` trait with in-memory and SQLite backends.

mod memory;
mod models;
mod repository;
mod sqlite;

pub use memory::MemoryRepository;
pub use models::{
    AutoLabel, CompilationStage, DataPoint, DeliveryOutcome, Discrepancy, DiscrepancyKey,
    DiscrepancyType, LogEntry, LogFilter, LogSeverity, ManualLabel, Metric, MetricFilter,
    MetricKey, MetricType, NewLogEntry, Notification, NotificationSeverity, ParseEnumError,
    Payload,
};
pub use repository::Repository;
pub use sqlite::SqliteRepository;

use std::sync::Arc;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Opens the repository named by `url`: `memory` or any `sqlite:` URL
pub async fn open(url: &str) -> Result<Arc<dyn Repository>, StorageError> {
    if url == "memory" {
        Ok(Arc::new(MemoryRepository::new()))
    } else {
        Ok(Arc::new(SqliteRepository::connect(url).await?))
    }
}
