//! Repository Interface
//!
//! Narrow, purpose-built queries over metrics, data points, log entries,
//! notifications and discrepancies. Every write is a single-record upsert or
//! conditional insert so concurrent writers never race on read-then-write.

use crate::models::{
    AutoLabel, DataPoint, DeliveryOutcome, Discrepancy, DiscrepancyKey, LogEntry, LogFilter,
    ManualLabel, Metric, MetricFilter, MetricKey, NewLogEntry, Notification, NotificationSeverity,
};
use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Repository: Send + Sync {
    /// Returns the metric for `key`, creating it with default labels if absent
    async fn get_or_create_metric(
        &self,
        key: &MetricKey,
        now: DateTime<Utc>,
    ) -> Result<Metric, StorageError>;

    async fn find_metric(&self, key: &MetricKey) -> Result<Option<Metric>, StorageError>;

    /// Metrics ordered by (type, source)
    async fn list_metrics(&self, filter: &MetricFilter) -> Result<Vec<Metric>, StorageError>;

    /// Sets the operator fields. Fails with `NotFound` if the metric does not exist.
    async fn update_metric(
        &self,
        key: &MetricKey,
        manual_label: ManualLabel,
        public: bool,
    ) -> Result<Metric, StorageError>;

    async fn set_auto_label(&self, key: &MetricKey, label: AutoLabel) -> Result<(), StorageError>;

    /// Removes the metric and all of its data points. Returns false if absent.
    async fn remove_metric(&self, key: &MetricKey) -> Result<bool, StorageError>;

    /// Appends a point, creating the metric on first use and bumping `last_updated`
    async fn append_point(&self, key: &MetricKey, point: DataPoint)
        -> Result<Metric, StorageError>;

    /// Points at or after `since`, oldest first
    async fn points_since(
        &self,
        key: &MetricKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, StorageError>;

    /// The most recent `limit` points, newest first
    async fn latest_points(
        &self,
        key: &MetricKey,
        limit: usize,
    ) -> Result<Vec<DataPoint>, StorageError>;

    async fn remove_points_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;

    async fn append_log(&self, entry: NewLogEntry) -> Result<LogEntry, StorageError>;

    /// Matching log entries, newest first
    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, StorageError>;

    async fn remove_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;

    /// Persists a new unsent notification
    async fn insert_notification(
        &self,
        severity: NotificationSeverity,
        message: &str,
        created: DateTime<Utc>,
    ) -> Result<Notification, StorageError>;

    /// Unsent notifications, oldest first. With `fresh_only`, only those never attempted.
    async fn pending_notifications(
        &self,
        fresh_only: bool,
    ) -> Result<Vec<Notification>, StorageError>;

    async fn record_delivery(&self, id: i64, outcome: DeliveryOutcome)
        -> Result<(), StorageError>;

    /// Every notification, newest first
    async fn notifications(&self) -> Result<Vec<Notification>, StorageError>;

    /// Inserts an open discrepancy unless a record with the same key exists.
    /// Returns true if a row was inserted.
    async fn insert_discrepancy_if_absent(
        &self,
        key: &DiscrepancyKey,
    ) -> Result<bool, StorageError>;

    async fn open_discrepancies(&self) -> Result<Vec<Discrepancy>, StorageError>;

    /// Marks an open discrepancy resolved. Returns false if it was not open.
    async fn resolve_discrepancy(
        &self,
        key: &DiscrepancyKey,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Every discrepancy, newest first offense first
    async fn discrepancies(&self) -> Result<Vec<Discrepancy>, StorageError>;

    async fn remove_resolved_discrepancies_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError>;
}
