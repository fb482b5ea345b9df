//! In-memory Repository

use crate::models::{
    AutoLabel, DataPoint, DeliveryOutcome, Discrepancy, DiscrepancyKey, LogEntry, LogFilter,
    ManualLabel, Metric, MetricFilter, MetricKey, NewLogEntry, Notification, NotificationSeverity,
};
use crate::repository::Repository;
use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Metrics and their points share a lock so cascading removal is atomic
#[derive(Default)]
struct MetricTables {
    metrics: BTreeMap<MetricKey, Metric>,
    points: HashMap<MetricKey, Vec<DataPoint>>,
}

struct Sequenced<T> {
    rows: Vec<T>,
    next_id: i64,
}

// Derived Default would require `T: Default`
impl<T> Default for Sequenced<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T> Sequenced<T> {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Repository held entirely in process memory
pub struct MemoryRepository {
    metrics: Mutex<MetricTables>,
    logs: Mutex<Sequenced<LogEntry>>,
    notifications: Mutex<Sequenced<Notification>>,
    discrepancies: Mutex<Sequenced<Discrepancy>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
}

impl MemoryRepository {
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self {
            metrics: Mutex::new(MetricTables::default()),
            logs: Mutex::new(Sequenced::default()),
            notifications: Mutex::new(Sequenced::default()),
            discrepancies: Mutex::new(Sequenced::default()),
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_or_create_metric(
        &self,
        key: &MetricKey,
        now: DateTime<Utc>,
    ) -> Result<Metric, StorageError> {
        let mut tables = lock(&self.metrics)?;
        let metric = tables
            .metrics
            .entry(key.clone())
            .or_insert_with(|| Metric::new(key, now));
        Ok(metric.clone())
    }

    async fn find_metric(&self, key: &MetricKey) -> Result<Option<Metric>, StorageError> {
        let tables = lock(&self.metrics)?;
        Ok(tables.metrics.get(key).cloned())
    }

    async fn list_metrics(&self, filter: &MetricFilter) -> Result<Vec<Metric>, StorageError> {
        let tables = lock(&self.metrics)?;
        Ok(tables
            .metrics
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    async fn update_metric(
        &self,
        key: &MetricKey,
        manual_label: ManualLabel,
        public: bool,
    ) -> Result<Metric, StorageError> {
        let mut tables = lock(&self.metrics)?;
        let metric = tables.metrics.get_mut(key).ok_or(StorageError::NotFound)?;
        metric.manual_label = manual_label;
        metric.public = public;
        Ok(metric.clone())
    }

    async fn set_auto_label(&self, key: &MetricKey, label: AutoLabel) -> Result<(), StorageError> {
        let mut tables = lock(&self.metrics)?;
        let metric = tables.metrics.get_mut(key).ok_or(StorageError::NotFound)?;
        metric.auto_label = label;
        Ok(())
    }

    async fn remove_metric(&self, key: &MetricKey) -> Result<bool, StorageError> {
        let mut tables = lock(&self.metrics)?;
        let removed = tables.metrics.remove(key).is_some();
        let points = tables.points.remove(key).map_or(0, |p| p.len());
        if removed {
            debug!("Removed metric {} with {} points", key, points);
        }
        Ok(removed)
    }

    async fn append_point(
        &self,
        key: &MetricKey,
        point: DataPoint,
    ) -> Result<Metric, StorageError> {
        let mut tables = lock(&self.metrics)?;
        let timestamp = point.timestamp;

        let series = tables.points.entry(key.clone()).or_default();
        // Keep the series sorted even when points arrive out of order
        let at = series.partition_point(|p| p.timestamp <= timestamp);
        series.insert(at, point);

        let metric = tables
            .metrics
            .entry(key.clone())
            .or_insert_with(|| Metric::new(key, timestamp));
        if timestamp > metric.last_updated {
            metric.last_updated = timestamp;
        }
        Ok(metric.clone())
    }

    async fn points_since(
        &self,
        key: &MetricKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let tables = lock(&self.metrics)?;
        let Some(series) = tables.points.get(key) else {
            return Ok(Vec::new());
        };
        let start = series.partition_point(|p| p.timestamp < since);
        Ok(series[start..].to_vec())
    }

    async fn latest_points(
        &self,
        key: &MetricKey,
        limit: usize,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let tables = lock(&self.metrics)?;
        Ok(tables
            .points
            .get(key)
            .map(|series| series.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_points_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut tables = lock(&self.metrics)?;
        let mut removed = 0u64;
        for series in tables.points.values_mut() {
            let before = series.len();
            series.retain(|p| p.timestamp >= cutoff);
            removed += (before - series.len()) as u64;
        }
        Ok(removed)
    }

    async fn append_log(&self, entry: NewLogEntry) -> Result<LogEntry, StorageError> {
        let mut logs = lock(&self.logs)?;
        let id = logs.next_id();
        let entry = entry.with_id(id);
        logs.rows.push(entry.clone());
        Ok(entry)
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, StorageError> {
        let logs = lock(&self.logs)?;
        let mut matching: Vec<LogEntry> = logs
            .rows
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn remove_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut logs = lock(&self.logs)?;
        let before = logs.rows.len();
        logs.rows.retain(|e| e.timestamp >= cutoff);
        Ok((before - logs.rows.len()) as u64)
    }

    async fn insert_notification(
        &self,
        severity: NotificationSeverity,
        message: &str,
        created: DateTime<Utc>,
    ) -> Result<Notification, StorageError> {
        let mut notifications = lock(&self.notifications)?;
        let notification = Notification {
            id: notifications.next_id(),
            severity,
            message: message.to_string(),
            is_sent: false,
            attempts: 0,
            date_created: created,
            date_sent: None,
        };
        notifications.rows.push(notification.clone());
        Ok(notification)
    }

    async fn pending_notifications(
        &self,
        fresh_only: bool,
    ) -> Result<Vec<Notification>, StorageError> {
        let notifications = lock(&self.notifications)?;
        Ok(notifications
            .rows
            .iter()
            .filter(|n| !n.is_sent && (!fresh_only || n.attempts == 0))
            .cloned()
            .collect())
    }

    async fn record_delivery(
        &self,
        id: i64,
        outcome: DeliveryOutcome,
    ) -> Result<(), StorageError> {
        let mut notifications = lock(&self.notifications)?;
        let notification = notifications
            .rows
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(StorageError::NotFound)?;
        notification.attempts += 1;
        if let DeliveryOutcome::Sent { at } = outcome {
            notification.is_sent = true;
            notification.date_sent = Some(at);
        }
        Ok(())
    }

    async fn notifications(&self) -> Result<Vec<Notification>, StorageError> {
        let notifications = lock(&self.notifications)?;
        Ok(notifications.rows.iter().rev().cloned().collect())
    }

    async fn insert_discrepancy_if_absent(
        &self,
        key: &DiscrepancyKey,
    ) -> Result<bool, StorageError> {
        let mut discrepancies = lock(&self.discrepancies)?;
        if discrepancies.rows.iter().any(|d| d.key() == *key) {
            return Ok(false);
        }
        let id = discrepancies.next_id();
        discrepancies.rows.push(Discrepancy {
            id,
            discrepancy_type: key.discrepancy_type,
            metric_type: key.metric_type,
            metric_source: key.metric_source.clone(),
            date_first_offense: key.date_first_offense,
            resolved: false,
            date_resolved: None,
        });
        Ok(true)
    }

    async fn open_discrepancies(&self) -> Result<Vec<Discrepancy>, StorageError> {
        let discrepancies = lock(&self.discrepancies)?;
        Ok(discrepancies
            .rows
            .iter()
            .filter(|d| !d.resolved)
            .cloned()
            .collect())
    }

    async fn resolve_discrepancy(
        &self,
        key: &DiscrepancyKey,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut discrepancies = lock(&self.discrepancies)?;
        match discrepancies
            .rows
            .iter_mut()
            .find(|d| !d.resolved && d.key() == *key)
        {
            Some(d) => {
                d.resolved = true;
                d.date_resolved = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn discrepancies(&self) -> Result<Vec<Discrepancy>, StorageError> {
        let discrepancies = lock(&self.discrepancies)?;
        let mut all = discrepancies.rows.clone();
        all.sort_by(|a, b| b.date_first_offense.cmp(&a.date_first_offense));
        Ok(all)
    }

    async fn remove_resolved_discrepancies_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut discrepancies = lock(&self.discrepancies)?;
        let before = discrepancies.rows.len();
        discrepancies
            .rows
            .retain(|d| !(d.resolved && d.date_resolved.map_or(false, |at| at < cutoff)));
        Ok((before - discrepancies.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscrepancyType, LogSeverity, MetricType};
    use chrono::Duration;

    fn cpu(source: &str) -> MetricKey {
        MetricKey::new(MetricType::CpuLoad, source)
    }

    #[tokio::test]
    async fn test_append_point_creates_metric_once() {
        let repo = MemoryRepository::new();
        let now = Utc::now();

        repo.append_point(&cpu("web-1"), DataPoint::numeric(now, 10.0))
            .await
            .unwrap();
        let metric = repo
            .append_point(&cpu("web-1"), DataPoint::numeric(now + Duration::seconds(5), 20.0))
            .await
            .unwrap();

        assert_eq!(metric.auto_label, AutoLabel::Normal);
        assert_eq!(metric.manual_label, ManualLabel::None);
        assert_eq!(metric.last_updated, now + Duration::seconds(5));
        assert_eq!(
            repo.list_metrics(&MetricFilter::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_points_are_ordered() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let key = cpu("web-1");

        for offset in [30, 10, 20] {
            repo.append_point(&key, DataPoint::numeric(now + Duration::seconds(offset), offset as f64))
                .await
                .unwrap();
        }

        let since = repo.points_since(&key, now + Duration::seconds(15)).await.unwrap();
        let values: Vec<_> = since.iter().filter_map(DataPoint::value).collect();
        assert_eq!(values, vec![20.0, 30.0]);

        let latest = repo.latest_points(&key, 2).await.unwrap();
        let values: Vec<_> = latest.iter().filter_map(DataPoint::value).collect();
        assert_eq!(values, vec![30.0, 20.0]);
    }

    #[tokio::test]
    async fn test_remove_metric_cascades() {
        let repo = MemoryRepository::new();
        let key = cpu("web-1");
        repo.append_point(&key, DataPoint::numeric(Utc::now(), 1.0))
            .await
            .unwrap();

        assert!(repo.remove_metric(&key).await.unwrap());
        assert!(repo.find_metric(&key).await.unwrap().is_none());
        assert!(repo.latest_points(&key, 10).await.unwrap().is_empty());
        assert!(!repo.remove_metric(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_metric_is_not_found() {
        let repo = MemoryRepository::new();
        let result = repo
            .update_metric(&cpu("ghost"), ManualLabel::Investigating, false)
            .await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn test_discrepancy_insert_is_conditional() {
        let repo = MemoryRepository::new();
        let key = DiscrepancyKey {
            discrepancy_type: DiscrepancyType::DataGap,
            metric_type: MetricType::CpuLoad,
            metric_source: "web-1".to_string(),
            date_first_offense: Utc::now(),
        };

        assert!(repo.insert_discrepancy_if_absent(&key).await.unwrap());
        assert!(!repo.insert_discrepancy_if_absent(&key).await.unwrap());
        assert_eq!(repo.open_discrepancies().await.unwrap().len(), 1);

        assert!(repo.resolve_discrepancy(&key, Utc::now()).await.unwrap());
        assert!(!repo.resolve_discrepancy(&key, Utc::now()).await.unwrap());
        assert!(repo.open_discrepancies().await.unwrap().is_empty());
        // Resolved history still blocks a duplicate of the same offense
        assert!(!repo.insert_discrepancy_if_absent(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_notification_delivery_tracking() {
        let repo = MemoryRepository::new();
        let first = repo
            .insert_notification(NotificationSeverity::High, "down", Utc::now())
            .await
            .unwrap();
        let second = repo
            .insert_notification(NotificationSeverity::Low, "slow", Utc::now())
            .await
            .unwrap();

        repo.record_delivery(first.id, DeliveryOutcome::Failed)
            .await
            .unwrap();
        assert_eq!(repo.pending_notifications(true).await.unwrap().len(), 1);
        assert_eq!(repo.pending_notifications(false).await.unwrap().len(), 2);

        repo.record_delivery(second.id, DeliveryOutcome::Sent { at: Utc::now() })
            .await
            .unwrap();
        let pending = repo.pending_notifications(false).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(repo.notifications().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_each_table_numbers_rows_from_one() {
        let repo = MemoryRepository::default();
        let now = Utc::now();

        let log = repo
            .append_log(NewLogEntry {
                source: "web-1".to_string(),
                category: 0,
                severity: LogSeverity::Error,
                message: "disk full".to_string(),
                auxiliary_data: None,
                timestamp: now,
            })
            .await
            .unwrap();
        let first = repo
            .insert_notification(NotificationSeverity::Low, "one", now)
            .await
            .unwrap();
        let second = repo
            .insert_notification(NotificationSeverity::Low, "two", now)
            .await
            .unwrap();
        repo.insert_discrepancy_if_absent(&DiscrepancyKey {
            discrepancy_type: DiscrepancyType::DataGap,
            metric_type: MetricType::CpuLoad,
            metric_source: "web-1".to_string(),
            date_first_offense: now,
        })
        .await
        .unwrap();

        assert_eq!(log.id, 1);
        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(repo.discrepancies().await.unwrap()[0].id, 1);
    }

    #[tokio::test]
    async fn test_log_retention() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        for age in [1, 10] {
            repo.append_log(NewLogEntry {
                source: "web-1".to_string(),
                category: 0,
                severity: LogSeverity::Info,
                message: format!("{} days old", age),
                auxiliary_data: None,
                timestamp: now - Duration::days(age),
            })
            .await
            .unwrap();
        }

        let removed = repo.remove_logs_before(now - Duration::days(5)).await.unwrap();
        assert_eq!(removed, 1);
        let remaining = repo.query_logs(&LogFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "1 days old");
    }
}
