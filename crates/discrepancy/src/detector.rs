//! Detector Implementation

use crate::checks::{find_gaps, find_runs, Findings, Offense};
use crate::config::DetectorConfig;
use crate::message::describe;
use alerting::NotificationSink;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use storage::{
    DataPoint, Discrepancy, DiscrepancyKey, DiscrepancyType, Metric, MetricFilter, MetricKey,
    MetricType, NotificationSeverity, Repository, StorageError,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Storage failure during scan: {0}")]
    Storage(#[from] StorageError),
}

/// Position of one (check, metric) pair in the Clear, Suspect, Open cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckState {
    #[default]
    Clear,
    Suspect,
    Open,
}

/// What one scan changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub opened: usize,
    pub resolved: usize,
    pub suspect: usize,
    /// Checks skipped because of a storage failure
    pub skipped: usize,
}

/// Checks that apply to a metric type
pub fn checks_for(metric_type: MetricType) -> &'static [DiscrepancyType] {
    match metric_type {
        MetricType::CpuLoad => &[DiscrepancyType::DataGap, DiscrepancyType::LoadSpike],
        MetricType::Ping => &[DiscrepancyType::RepeatedFailure],
        MetricType::Health => &[DiscrepancyType::LowHealth],
        _ => &[],
    }
}

/// Notification tier requested when a discrepancy opens
pub fn severity_for(discrepancy_type: DiscrepancyType) -> NotificationSeverity {
    match discrepancy_type {
        DiscrepancyType::DataGap => NotificationSeverity::High,
        DiscrepancyType::RepeatedFailure => NotificationSeverity::High,
        DiscrepancyType::LowHealth => NotificationSeverity::High,
        DiscrepancyType::LoadSpike => NotificationSeverity::Medium,
    }
}

/// Whether an earlier record already covers a run that starts at the window edge.
/// It does unless that record was resolved before the run began.
fn covered(records: &[&Discrepancy], start: DateTime<Utc>) -> bool {
    records.iter().any(|d| {
        d.date_first_offense <= start && d.date_resolved.map_or(true, |at| at >= start)
    })
}

#[derive(Debug, Default)]
struct CheckOutcome {
    opened: usize,
    resolved: usize,
    state: CheckState,
}

pub struct DiscrepancyDetector {
    repository: Arc<dyn Repository>,
    notifications: Arc<dyn NotificationSink>,
    config: DetectorConfig,
    states: Mutex<HashMap<(DiscrepancyType, MetricKey), CheckState>>,
}

impl DiscrepancyDetector {
    pub fn new(
        repository: Arc<dyn Repository>,
        notifications: Arc<dyn NotificationSink>,
        config: DetectorConfig,
    ) -> Self {
        info!(
            data_timeframe = config.data_timeframe,
            max_difference = config.gaps.max_difference,
            load_threshold = config.load.threshold,
            health_threshold = config.health.threshold,
            "Creating discrepancy detector"
        );
        Self {
            repository,
            notifications,
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Last known state of a check, for diagnostics
    pub fn state(&self, discrepancy_type: DiscrepancyType, key: &MetricKey) -> CheckState {
        self.states
            .lock()
            .map(|states| {
                states
                    .get(&(discrepancy_type, key.clone()))
                    .copied()
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// One pass over every metric. Running it again without new data changes nothing.
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<ScanReport, DetectorError> {
        let metrics = self.repository.list_metrics(&MetricFilter::default()).await?;
        let records = self.repository.discrepancies().await?;
        let mut report = ScanReport::default();
        let mut states = HashMap::new();

        for metric in &metrics {
            for &check in checks_for(metric.metric_type) {
                let key = metric.key();
                let history: Vec<&Discrepancy> = records
                    .iter()
                    .filter(|d| d.discrepancy_type == check && d.metric_key() == key)
                    .collect();

                match self.run_check(check, metric, &history, now).await {
                    Ok(outcome) => {
                        report.opened += outcome.opened;
                        report.resolved += outcome.resolved;
                        report.suspect += usize::from(outcome.state == CheckState::Suspect);
                        self.record_transition(check, &key, outcome.state);
                        states.insert((check, key), outcome.state);
                    }
                    Err(e) => {
                        // Retried on the next tick
                        error!(check = %check, metric = %key, "Skipping check: {}", e);
                        report.skipped += 1;
                        states.insert((check, key.clone()), self.state(check, &key));
                    }
                }
            }
        }

        report.resolved += self.resolve_orphans(&metrics, &records, now).await;

        // Forget removed metrics
        if let Ok(mut guard) = self.states.lock() {
            *guard = states;
        }

        if report.opened > 0 || report.resolved > 0 {
            info!(
                opened = report.opened,
                resolved = report.resolved,
                suspect = report.suspect,
                "Discrepancy scan finished"
            );
        } else {
            debug!(suspect = report.suspect, "Discrepancy scan finished");
        }
        Ok(report)
    }

    async fn run_check(
        &self,
        check: DiscrepancyType,
        metric: &Metric,
        history: &[&Discrepancy],
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome, DetectorError> {
        let key = metric.key();
        let mut outcome = CheckOutcome::default();
        let findings = self.evaluate(check, metric, now).await?;

        let mut pending: Vec<DateTime<Utc>> = history
            .iter()
            .filter(|d| !d.resolved)
            .map(|d| d.date_first_offense)
            .collect();

        for offense in &findings.offenses {
            if offense.truncated && covered(history, offense.first_offense) {
                continue;
            }
            if self.record(check, &key, offense).await? {
                outcome.opened += 1;
                pending.push(offense.first_offense);
            }
        }

        let mut still_open = 0;
        for first_offense in pending {
            if !self.cleared(check, &key, first_offense).await? {
                still_open += 1;
                continue;
            }
            let record = DiscrepancyKey {
                discrepancy_type: check,
                metric_type: key.metric_type,
                metric_source: key.source.clone(),
                date_first_offense: first_offense,
            };
            if self.repository.resolve_discrepancy(&record, now).await? {
                metrics::counter!("discrepancies_resolved_total", "type" => check.as_str())
                    .increment(1);
                info!(check = %check, metric = %key, first_offense = %first_offense, "Discrepancy resolved");
                outcome.resolved += 1;
            }
        }

        outcome.state = if still_open > 0 {
            CheckState::Open
        } else if findings.suspect {
            CheckState::Suspect
        } else {
            CheckState::Clear
        };
        Ok(outcome)
    }

    /// Stores an offense unless it is already known, and asks for a notification
    async fn record(
        &self,
        check: DiscrepancyType,
        key: &MetricKey,
        offense: &Offense,
    ) -> Result<bool, DetectorError> {
        let record = DiscrepancyKey {
            discrepancy_type: check,
            metric_type: key.metric_type,
            metric_source: key.source.clone(),
            date_first_offense: offense.first_offense,
        };
        if !self.repository.insert_discrepancy_if_absent(&record).await? {
            return Ok(false);
        }

        metrics::counter!("discrepancies_opened_total", "type" => check.as_str()).increment(1);
        let message = describe(&record);
        warn!(check = %check, metric = %key, ongoing = offense.ongoing, "{}", message);
        // Delivery problems never fail the scan
        if let Err(e) = self.notifications.notify(&message, severity_for(check)).await {
            error!(check = %check, metric = %key, "Failed to request notification: {}", e);
        }
        Ok(true)
    }

    /// Open records whose metric no longer exists can never clear on their own
    async fn resolve_orphans(
        &self,
        listed: &[Metric],
        records: &[Discrepancy],
        now: DateTime<Utc>,
    ) -> usize {
        let known: HashSet<MetricKey> = listed.iter().map(Metric::key).collect();
        let mut resolved = 0;
        for orphan in records
            .iter()
            .filter(|d| !d.resolved && !known.contains(&d.metric_key()))
        {
            match self.repository.resolve_discrepancy(&orphan.key(), now).await {
                Ok(true) => {
                    metrics::counter!(
                        "discrepancies_resolved_total",
                        "type" => orphan.discrepancy_type.as_str()
                    )
                    .increment(1);
                    info!(
                        check = %orphan.discrepancy_type,
                        metric = %orphan.metric_key(),
                        "Discrepancy resolved, metric was removed"
                    );
                    resolved += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(metric = %orphan.metric_key(), "Failed to resolve orphaned discrepancy: {}", e);
                }
            }
        }
        resolved
    }

    async fn evaluate(
        &self,
        check: DiscrepancyType,
        metric: &Metric,
        now: DateTime<Utc>,
    ) -> Result<Findings, DetectorError> {
        let key = metric.key();
        let window = self
            .repository
            .points_since(&key, now - self.config.data_timeframe())
            .await?;

        let findings = match check {
            DiscrepancyType::DataGap => {
                let mut timestamps: Vec<DateTime<Utc>> =
                    window.iter().map(|p| p.timestamp).collect();
                if timestamps.is_empty() {
                    let latest = self
                        .repository
                        .latest_points(&key, 1)
                        .await?
                        .first()
                        .map(|p| p.timestamp)
                        .unwrap_or(metric.last_updated);
                    timestamps.push(latest);
                }
                find_gaps(&timestamps, now, self.config.max_difference())
            }
            DiscrepancyType::LoadSpike => {
                let threshold = self.config.load.threshold;
                find_runs(&window, self.config.load.max_failures, |p| {
                    p.value().map_or(false, |v| v >= threshold)
                })
            }
            DiscrepancyType::RepeatedFailure => {
                find_runs(&window, self.config.ping.max_failures, DataPoint::is_failure)
            }
            DiscrepancyType::LowHealth => {
                let threshold = f64::from(self.config.health.threshold);
                find_runs(&window, self.config.health.max_failures, |p| {
                    p.value().map_or(false, |v| v < threshold)
                })
            }
        };
        Ok(findings)
    }

    /// Whether data after `first_offense` shows the condition has ended
    async fn cleared(
        &self,
        check: DiscrepancyType,
        key: &MetricKey,
        first_offense: DateTime<Utc>,
    ) -> Result<bool, DetectorError> {
        let since = self.repository.points_since(key, first_offense).await?;
        let mut later = since.iter().filter(|p| p.timestamp > first_offense);
        let cleared = match check {
            DiscrepancyType::DataGap => later.next().is_some(),
            DiscrepancyType::LoadSpike => {
                let threshold = self.config.load.threshold;
                later.any(|p| p.value().map_or(false, |v| v <= threshold))
            }
            DiscrepancyType::RepeatedFailure => later.any(|p| !p.is_failure()),
            DiscrepancyType::LowHealth => {
                let threshold = f64::from(self.config.health.threshold);
                later.any(|p| p.value().map_or(false, |v| v >= threshold))
            }
        };
        Ok(cleared)
    }

    fn record_transition(&self, check: DiscrepancyType, key: &MetricKey, next: CheckState) {
        let previous = self.state(check, key);
        if previous != next {
            debug!(
                check = %check,
                metric = %key,
                from = ?previous,
                to = ?next,
                "Check state changed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GapConfig, HealthConfig, LoadConfig, PingFailureConfig};
    use alerting::NotifyError;
    use async_trait::async_trait;
    use chrono::Duration;
    use storage::MemoryRepository;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, NotificationSeverity)>>,
    }

    impl RecordingSink {
        fn messages(&self) -> Vec<(String, NotificationSeverity)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(
            &self,
            message: &str,
            severity: NotificationSeverity,
        ) -> Result<bool, NotifyError> {
            self.sent.lock().unwrap().push((message.to_string(), severity));
            Ok(true)
        }
    }

    fn config() -> DetectorConfig {
        DetectorConfig {
            data_timeframe: 3_600,
            gaps: GapConfig {
                max_difference: 300,
            },
            load: LoadConfig {
                threshold: 90.0,
                max_failures: 3,
            },
            ping: PingFailureConfig { max_failures: 3 },
            health: HealthConfig {
                threshold: 70,
                max_failures: 3,
            },
        }
    }

    fn setup() -> (Arc<MemoryRepository>, Arc<RecordingSink>, DiscrepancyDetector) {
        let repo = Arc::new(MemoryRepository::new());
        let sink = Arc::new(RecordingSink::default());
        let detector = DiscrepancyDetector::new(repo.clone(), sink.clone(), config());
        (repo, sink, detector)
    }

    fn cpu(source: &str) -> MetricKey {
        MetricKey::new(MetricType::CpuLoad, source)
    }

    #[tokio::test]
    async fn test_data_gap_opens_once_and_clears() {
        let (repo, sink, detector) = setup();
        let now = Utc::now();
        let key = cpu("web-1");
        let last = now - Duration::minutes(10);
        repo.append_point(&key, DataPoint::numeric(last, 20.0)).await.unwrap();

        let report = detector.scan(now).await.unwrap();
        assert_eq!(report.opened, 1);
        assert_eq!(detector.state(DiscrepancyType::DataGap, &key), CheckState::Open);

        // Idempotent while nothing changes
        let report = detector.scan(now + Duration::seconds(30)).await.unwrap();
        assert_eq!(report.opened, 0);
        assert_eq!(repo.discrepancies().await.unwrap().len(), 1);
        assert_eq!(sink.messages().len(), 1);
        assert_eq!(sink.messages()[0].1, NotificationSeverity::High);

        let open = repo.open_discrepancies().await.unwrap();
        assert_eq!(open[0].metric_source, "web-1");
        assert_eq!(open[0].date_first_offense, last);

        // Fresh data clears it on the next scan
        let later = now + Duration::minutes(1);
        repo.append_point(&key, DataPoint::numeric(later, 25.0)).await.unwrap();
        let report = detector.scan(later).await.unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(report.opened, 0);
        assert!(repo.open_discrepancies().await.unwrap().is_empty());
        assert_eq!(detector.state(DiscrepancyType::DataGap, &key), CheckState::Clear);
        assert_eq!(sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_gap_suspect_before_open() {
        let (repo, sink, detector) = setup();
        let now = Utc::now();
        let key = cpu("web-1");
        repo.append_point(&key, DataPoint::numeric(now - Duration::seconds(200), 20.0))
            .await
            .unwrap();

        let report = detector.scan(now).await.unwrap();
        assert_eq!(report.suspect, 1);
        assert_eq!(report.opened, 0);
        assert_eq!(detector.state(DiscrepancyType::DataGap, &key), CheckState::Suspect);
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_load_spike_lifecycle() {
        let (repo, sink, detector) = setup();
        let now = Utc::now();
        let key = cpu("db-1");
        let start = now - Duration::seconds(50);
        for (i, v) in [20.0, 95.0, 96.0, 97.0, 98.0].iter().enumerate() {
            repo.append_point(&key, DataPoint::numeric(start + Duration::seconds(10 * i as i64), *v))
                .await
                .unwrap();
        }

        let report = detector.scan(now).await.unwrap();
        assert_eq!(report.opened, 1);
        let open = repo.open_discrepancies().await.unwrap();
        assert_eq!(open[0].discrepancy_type, DiscrepancyType::LoadSpike);
        assert_eq!(open[0].date_first_offense, start + Duration::seconds(10));
        assert_eq!(sink.messages()[0].1, NotificationSeverity::Medium);

        // Still high: stays open without re-notifying
        repo.append_point(&key, DataPoint::numeric(now, 99.0)).await.unwrap();
        assert_eq!(detector.scan(now).await.unwrap().opened, 0);
        assert_eq!(sink.messages().len(), 1);

        repo.append_point(&key, DataPoint::numeric(now + Duration::seconds(10), 30.0))
            .await
            .unwrap();
        let report = detector.scan(now + Duration::seconds(10)).await.unwrap();
        assert_eq!(report.resolved, 1);
        assert!(repo.open_discrepancies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_spike_can_reopen_after_recovery() {
        let (repo, sink, detector) = setup();
        let now = Utc::now();
        let key = cpu("db-1");
        let at = |s: i64| now - Duration::seconds(100) + Duration::seconds(s);

        for s in 0..4 {
            repo.append_point(&key, DataPoint::numeric(at(s), 95.0)).await.unwrap();
        }
        detector.scan(at(4)).await.unwrap();

        // Recovery followed by a second spike before the next scan
        repo.append_point(&key, DataPoint::numeric(at(10), 10.0)).await.unwrap();
        for s in 20..24 {
            repo.append_point(&key, DataPoint::numeric(at(s), 95.0)).await.unwrap();
        }
        let report = detector.scan(at(25)).await.unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(report.opened, 1);

        let open = repo.open_discrepancies().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].date_first_offense, at(20));
        assert_eq!(sink.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_ping_failures() {
        let (repo, sink, detector) = setup();
        let now = Utc::now();
        let key = MetricKey::new(MetricType::Ping, "example.com");
        let start = now - Duration::minutes(5);
        let outcomes = [true, false, false, false, false];
        for (i, ok) in outcomes.iter().enumerate() {
            repo.append_point(&key, DataPoint::ping(start + Duration::minutes(i as i64), 40, *ok))
                .await
                .unwrap();
        }

        let report = detector.scan(now).await.unwrap();
        assert_eq!(report.opened, 1);
        assert!(sink.messages()[0].0.contains("failed too many consecutive times"));

        repo.append_point(&key, DataPoint::ping(now, 35, true)).await.unwrap();
        let report = detector.scan(now).await.unwrap();
        assert_eq!(report.resolved, 1);
    }

    #[tokio::test]
    async fn test_other_metric_types_are_not_checked() {
        let (repo, sink, detector) = setup();
        let now = Utc::now();
        repo.append_point(
            &MetricKey::new(MetricType::UserAction, "app"),
            DataPoint::new(
                now - Duration::days(2),
                storage::Payload::UserAction {
                    action: "login".to_string(),
                    count: 1,
                },
            ),
        )
        .await
        .unwrap();

        let report = detector.scan(now).await.unwrap();
        assert_eq!(report, ScanReport::default());
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_spike_between_scans_is_recorded_and_resolved() {
        let (repo, sink, detector) = setup();
        let now = Utc::now();
        let key = cpu("db-1");
        let at = |s: i64| now + Duration::seconds(s);

        repo.append_point(&key, DataPoint::numeric(now, 20.0)).await.unwrap();
        assert_eq!(detector.scan(now).await.unwrap(), ScanReport::default());

        // Starts and ends before the next tick
        for (i, v) in [95.0, 96.0, 97.0, 98.0, 30.0].iter().enumerate() {
            repo.append_point(&key, DataPoint::numeric(at(10 * (i as i64 + 1)), *v))
                .await
                .unwrap();
        }
        let report = detector.scan(at(60)).await.unwrap();
        assert_eq!(report.opened, 1);
        assert_eq!(report.resolved, 1);
        assert!(repo.open_discrepancies().await.unwrap().is_empty());
        assert_eq!(detector.state(DiscrepancyType::LoadSpike, &key), CheckState::Clear);

        let history = repo.discrepancies().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].discrepancy_type, DiscrepancyType::LoadSpike);
        assert_eq!(history[0].date_first_offense, at(10));
        assert!(history[0].resolved);
        assert_eq!(sink.messages().len(), 1);

        let report = detector.scan(at(90)).await.unwrap();
        assert_eq!((report.opened, report.resolved), (0, 0));
        assert_eq!(repo.discrepancies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gap_inside_window_is_recorded_and_resolved() {
        let (repo, sink, detector) = setup();
        let now = Utc::now();
        let key = cpu("web-1");
        let ago = |m: i64| now - Duration::minutes(m);
        for m in [40, 39, 20, 17, 14, 11, 8, 5, 2] {
            repo.append_point(&key, DataPoint::numeric(ago(m), 20.0)).await.unwrap();
        }

        let report = detector.scan(now).await.unwrap();
        assert_eq!(report.opened, 1);
        assert_eq!(report.resolved, 1);
        let history = repo.discrepancies().await.unwrap();
        assert_eq!(history[0].discrepancy_type, DiscrepancyType::DataGap);
        assert_eq!(history[0].date_first_offense, ago(39));
        assert_eq!(sink.messages().len(), 1);

        assert_eq!(detector.scan(now).await.unwrap().opened, 0);
    }

    #[tokio::test]
    async fn test_long_outage_is_recorded_once_as_window_slides() {
        let (repo, sink, detector) = setup();
        let now = Utc::now();
        let key = MetricKey::new(MetricType::Ping, "example.com");
        for m in (0..6).rev() {
            let at = now - Duration::minutes(10 * m + 5);
            repo.append_point(&key, DataPoint::ping(at, 0, false)).await.unwrap();
        }

        assert_eq!(detector.scan(now).await.unwrap().opened, 1);

        // The first failure falls out of the window while the outage goes on
        for step in 1..=3 {
            let later = now + Duration::minutes(10 * step);
            repo.append_point(&key, DataPoint::ping(later, 0, false)).await.unwrap();
            let report = detector.scan(later).await.unwrap();
            assert_eq!(report.opened, 0);
        }
        assert_eq!(repo.discrepancies().await.unwrap().len(), 1);
        assert_eq!(repo.open_discrepancies().await.unwrap().len(), 1);
        assert_eq!(sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_removed_metric_resolves_its_discrepancies() {
        let (repo, _sink, detector) = setup();
        let now = Utc::now();
        let key = cpu("web-1");
        repo.append_point(&key, DataPoint::numeric(now - Duration::minutes(10), 20.0))
            .await
            .unwrap();
        assert_eq!(detector.scan(now).await.unwrap().opened, 1);

        assert!(repo.remove_metric(&key).await.unwrap());
        let report = detector.scan(now + Duration::hours(1)).await.unwrap();
        assert_eq!(report.resolved, 1);
        assert!(repo.open_discrepancies().await.unwrap().is_empty());
        assert_eq!(detector.state(DiscrepancyType::DataGap, &key), CheckState::Clear);

        let report = detector.scan(now + Duration::hours(2)).await.unwrap();
        assert_eq!(report, ScanReport::default());
    }

    #[tokio::test]
    async fn test_load_at_threshold_resolves_spike() {
        let (repo, _sink, detector) = setup();
        let now = Utc::now();
        let key = cpu("db-1");
        let start = now - Duration::seconds(40);
        for i in 0..4 {
            repo.append_point(&key, DataPoint::numeric(start + Duration::seconds(10 * i), 95.0))
                .await
                .unwrap();
        }
        assert_eq!(detector.scan(now).await.unwrap().opened, 1);

        repo.append_point(&key, DataPoint::numeric(now, 90.0)).await.unwrap();
        let report = detector.scan(now).await.unwrap();
        assert_eq!(report.resolved, 1);
        assert!(repo.open_discrepancies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_low_health_opens_and_clears() {
        let (repo, sink, detector) = setup();
        let now = Utc::now();
        let key = MetricKey::new(MetricType::Health, "system");
        let start = now - Duration::minutes(5);
        for (i, health) in [100u8, 50, 40, 50, 60].iter().enumerate() {
            repo.append_point(
                &key,
                DataPoint::new(
                    start + Duration::minutes(i as i64),
                    storage::Payload::Health { health: *health },
                ),
            )
            .await
            .unwrap();
        }

        let report = detector.scan(now).await.unwrap();
        assert_eq!(report.opened, 1);
        let open = repo.open_discrepancies().await.unwrap();
        assert_eq!(open[0].discrepancy_type, DiscrepancyType::LowHealth);
        assert_eq!(open[0].date_first_offense, start + Duration::minutes(1));
        assert_eq!(sink.messages()[0].1, NotificationSeverity::High);

        repo.append_point(&key, DataPoint::new(now, storage::Payload::Health { health: 70 }))
            .await
            .unwrap();
        assert_eq!(detector.scan(now).await.unwrap().resolved, 1);
    }

    #[test]
    fn test_health_metrics_get_the_low_health_check() {
        assert_eq!(checks_for(MetricType::Health), &[DiscrepancyType::LowHealth]);
        assert!(checks_for(MetricType::Log).is_empty());
    }
}
