use crate::task::PeriodicTask;
use async_trait::async_trait;
use chrono::Utc;
use discrepancy::DiscrepancyDetector;
use std::sync::Arc;

/// Runs one detector scan per tick
pub struct DiscrepancyTask {
    detector: Arc<DiscrepancyDetector>,
}

impl DiscrepancyTask {
    pub fn new(detector: Arc<DiscrepancyDetector>) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl PeriodicTask for DiscrepancyTask {
    fn name(&self) -> &'static str {
        "discrepancy"
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.detector.scan(Utc::now()).await?;
        Ok(())
    }
}
