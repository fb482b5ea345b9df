//! Label Engine Implementation

use crate::config::{LabelConfig, ManualOverridePolicy};
use crate::strategy::LabelStrategy;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use storage::{AutoLabel, DataPoint, ManualLabel, Metric, MetricType, Repository, StorageError};
use tracing::{debug, info};

/// Label shown to operators: the manual label when one is set, otherwise the auto label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayLabel {
    Auto(AutoLabel),
    Manual(ManualLabel),
}

impl DisplayLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayLabel::Auto(label) => label.as_str(),
            DisplayLabel::Manual(label) => label.as_str(),
        }
    }
}

impl fmt::Display for DisplayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DisplayLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Maps metric types to their labelling strategy. Stateless between calls.
#[derive(Debug, Clone)]
pub struct LabelEngine {
    config: LabelConfig,
    strategies: HashMap<MetricType, LabelStrategy>,
}

impl LabelEngine {
    pub fn new(config: LabelConfig) -> Self {
        let mut strategies = HashMap::new();
        strategies.insert(
            MetricType::CpuLoad,
            LabelStrategy::CpuThreshold {
                samples: config.cpu_samples,
                warning: config.cpu_warning,
                critical: config.cpu_critical,
            },
        );
        strategies.insert(
            MetricType::Ping,
            LabelStrategy::PingFailures {
                window: config.ping_window,
                max_failures: config.ping_max_failures,
            },
        );
        Self { config, strategies }
    }

    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    pub fn strategy_for(&self, metric_type: MetricType) -> &LabelStrategy {
        self.strategies
            .get(&metric_type)
            .unwrap_or(&LabelStrategy::Passive)
    }

    /// Number of latest points `evaluate` looks at for this type
    pub fn sample_size(&self, metric_type: MetricType) -> usize {
        self.strategy_for(metric_type).sample_size()
    }

    /// Label for `recent` points of a metric, newest first
    pub fn evaluate(&self, metric_type: MetricType, recent: &[DataPoint]) -> AutoLabel {
        let label = self.strategy_for(metric_type).evaluate(recent);
        debug!(
            metric_type = %metric_type,
            points = recent.len(),
            label = %label,
            "Evaluated auto label"
        );
        label
    }

    /// Whether the stored auto label of `metric` should be refreshed
    pub fn should_recompute(&self, metric: &Metric) -> bool {
        match self.config.manual_override {
            ManualOverridePolicy::DisplayOnly => true,
            ManualOverridePolicy::SuppressAuto => !metric.manual_label.is_set(),
        }
    }

    /// Re-evaluates `metric` from its latest stored points and persists a changed label
    pub async fn refresh(
        &self,
        repository: &dyn Repository,
        metric: &Metric,
    ) -> Result<AutoLabel, StorageError> {
        let samples = self.sample_size(metric.metric_type);
        if samples == 0 || !self.should_recompute(metric) {
            return Ok(metric.auto_label);
        }

        let key = metric.key();
        let recent = repository.latest_points(&key, samples).await?;
        let label = self.evaluate(metric.metric_type, &recent);
        if label != metric.auto_label {
            repository.set_auto_label(&key, label).await?;
            info!(metric = %key, from = %metric.auto_label, to = %label, "Auto label changed");
        }
        Ok(label)
    }

    pub fn display_label(&self, metric: &Metric) -> DisplayLabel {
        if metric.manual_label.is_set() {
            DisplayLabel::Manual(metric.manual_label)
        } else {
            DisplayLabel::Auto(metric.auto_label)
        }
    }
}

impl Default for LabelEngine {
    fn default() -> Self {
        Self::new(LabelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use storage::MetricKey;

    fn points(values: &[f64]) -> Vec<DataPoint> {
        let now = Utc::now();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DataPoint::numeric(now - Duration::seconds(i as i64), *v))
            .collect()
    }

    #[test]
    fn test_strategy_selection() {
        let engine = LabelEngine::default();
        assert!(matches!(
            engine.strategy_for(MetricType::CpuLoad),
            LabelStrategy::CpuThreshold { .. }
        ));
        assert!(matches!(
            engine.strategy_for(MetricType::Ping),
            LabelStrategy::PingFailures { .. }
        ));
        assert_eq!(
            engine.strategy_for(MetricType::Compilation),
            &LabelStrategy::Passive
        );
        assert_eq!(engine.sample_size(MetricType::CpuLoad), 5);
    }

    #[test]
    fn test_manual_label_wins_display() {
        let engine = LabelEngine::default();
        let mut metric = Metric::new(&MetricKey::new(MetricType::CpuLoad, "web-1"), Utc::now());
        metric.auto_label = AutoLabel::Critical;
        assert_eq!(engine.display_label(&metric).as_str(), "critical");

        metric.manual_label = ManualLabel::Investigating;
        assert_eq!(engine.display_label(&metric).as_str(), "investigating");
        assert!(engine.should_recompute(&metric));
    }

    #[test]
    fn test_suppress_policy_freezes_auto_label() {
        let engine = LabelEngine::new(LabelConfig {
            manual_override: ManualOverridePolicy::SuppressAuto,
            ..Default::default()
        });
        let mut metric = Metric::new(&MetricKey::new(MetricType::CpuLoad, "web-1"), Utc::now());
        assert!(engine.should_recompute(&metric));

        metric.manual_label = ManualLabel::Investigating;
        assert!(!engine.should_recompute(&metric));
    }

    #[tokio::test]
    async fn test_refresh_persists_changed_label() {
        let repo = storage::MemoryRepository::new();
        let engine = LabelEngine::default();
        let key = MetricKey::new(MetricType::CpuLoad, "web-1");
        let now = Utc::now();

        let mut metric = None;
        for (i, v) in [95.0, 96.0, 97.0, 98.0, 99.0].iter().enumerate() {
            metric = Some(
                repo.append_point(&key, DataPoint::numeric(now + Duration::seconds(i as i64), *v))
                    .await
                    .unwrap(),
            );
        }
        let metric = metric.unwrap();

        let label = engine.refresh(&repo, &metric).await.unwrap();
        assert_eq!(label, AutoLabel::Critical);
        let stored = repo.find_metric(&key).await.unwrap().unwrap();
        assert_eq!(stored.auto_label, AutoLabel::Critical);
    }

    proptest! {
        #[test]
        fn prop_evaluation_is_deterministic(values in proptest::collection::vec(0.0f64..100.0, 0..20)) {
            let engine = LabelEngine::default();
            let recent = points(&values);
            let first = engine.evaluate(MetricType::CpuLoad, &recent);
            let second = engine.evaluate(MetricType::CpuLoad, &recent);
            prop_assert_eq!(first, second);
        }
    }
}
