use crate::config::CleanConfig;
use crate::task::PeriodicTask;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use storage::{Repository, StorageError};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub points: u64,
    pub logs: u64,
    pub discrepancies: u64,
}

/// Removes history older than the configured age. Notifications are kept.
pub struct CleanService {
    repository: Arc<dyn Repository>,
    config: CleanConfig,
}

impl CleanService {
    pub fn new(repository: Arc<dyn Repository>, config: CleanConfig) -> Self {
        Self { repository, config }
    }

    pub async fn clean_at(&self, now: DateTime<Utc>) -> Result<CleanReport, StorageError> {
        let cutoff = now - self.config.max_age();
        let report = CleanReport {
            points: self.repository.remove_points_before(cutoff).await?,
            logs: self.repository.remove_logs_before(cutoff).await?,
            discrepancies: self
                .repository
                .remove_resolved_discrepancies_before(cutoff)
                .await?,
        };

        if report == CleanReport::default() {
            debug!(cutoff = %cutoff, "Nothing to clean");
        } else {
            info!(
                cutoff = %cutoff,
                points = report.points,
                logs = report.logs,
                discrepancies = report.discrepancies,
                "Removed old data"
            );
        }
        Ok(report)
    }
}

#[async_trait]
impl PeriodicTask for CleanService {
    fn name(&self) -> &'static str {
        "clean"
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.clean_at(Utc::now()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storage::{
        DataPoint, DiscrepancyKey, DiscrepancyType, LogSeverity, MemoryRepository, MetricKey,
        MetricType, NewLogEntry, NotificationSeverity,
    };

    #[tokio::test]
    async fn test_removes_only_old_history() {
        let repo = Arc::new(MemoryRepository::new());
        let service = CleanService::new(repo.clone(), CleanConfig { max_age: 3_600 });
        let now = Utc::now();
        let old = now - Duration::hours(2);
        let key = MetricKey::new(MetricType::CpuLoad, "web-1");

        repo.append_point(&key, DataPoint::numeric(old, 10.0)).await.unwrap();
        repo.append_point(&key, DataPoint::numeric(now, 20.0)).await.unwrap();
        for timestamp in [old, now] {
            repo.append_log(NewLogEntry {
                source: "web-1".to_string(),
                category: 1,
                severity: LogSeverity::Error,
                message: "disk full".to_string(),
                auxiliary_data: None,
                timestamp,
            })
            .await
            .unwrap();
        }
        repo.insert_notification(NotificationSeverity::High, "old news", old)
            .await
            .unwrap();

        let resolved = DiscrepancyKey {
            discrepancy_type: DiscrepancyType::DataGap,
            metric_type: MetricType::CpuLoad,
            metric_source: "web-1".to_string(),
            date_first_offense: old - Duration::hours(1),
        };
        let open = DiscrepancyKey {
            date_first_offense: old,
            discrepancy_type: DiscrepancyType::LoadSpike,
            ..resolved.clone()
        };
        repo.insert_discrepancy_if_absent(&resolved).await.unwrap();
        repo.insert_discrepancy_if_absent(&open).await.unwrap();
        repo.resolve_discrepancy(&resolved, old).await.unwrap();

        let report = service.clean_at(now).await.unwrap();
        assert_eq!(
            report,
            CleanReport {
                points: 1,
                logs: 1,
                discrepancies: 1,
            }
        );

        assert_eq!(repo.latest_points(&key, 10).await.unwrap().len(), 1);
        assert_eq!(repo.open_discrepancies().await.unwrap().len(), 1);
        assert_eq!(repo.notifications().await.unwrap().len(), 1);

        // Second pass has nothing left to do
        assert_eq!(service.clean_at(now).await.unwrap(), CleanReport::default());
    }
}
