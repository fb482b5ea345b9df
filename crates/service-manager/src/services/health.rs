use crate::task::PeriodicTask;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labeling::{system_health_key, HealthReport};
use std::sync::Arc;
use storage::{DataPoint, MetricFilter, Payload, Repository, StorageError};
use tracing::debug;

/// Stores the overall health of public metrics as a point of the system health metric,
/// which the detector watches for sustained low health
pub struct HealthService {
    repository: Arc<dyn Repository>,
}

impl HealthService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Returns the stored report, or None when there is nothing to report on yet
    pub async fn snapshot_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<HealthReport>, StorageError> {
        let metrics = self
            .repository
            .list_metrics(&MetricFilter {
                public_only: true,
                ..Default::default()
            })
            .await?;
        let report = HealthReport::from_metrics(&metrics);
        if report.data.is_empty() {
            debug!("No metrics, no health snapshot");
            return Ok(None);
        }

        self.repository
            .append_point(
                &system_health_key(),
                DataPoint::new(now, Payload::Health { health: report.health }),
            )
            .await?;
        debug!(health = report.health, metrics = report.data.len(), "Health snapshot stored");
        Ok(Some(report))
    }
}

#[async_trait]
impl PeriodicTask for HealthService {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.snapshot_at(Utc::now()).await?;
        Ok(())
    }
}
