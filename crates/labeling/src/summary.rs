//! Metric value summaries over the last hour and day

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use storage::DataPoint;

/// Min/max/average over one lookback window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub samples: usize,
}

impl WindowStats {
    pub fn compute(values: impl IntoIterator<Item = f64>) -> Self {
        let mut stats = Self::default();
        let mut sum = 0.0;
        for v in values {
            stats.min = Some(stats.min.map_or(v, |m| m.min(v)));
            stats.max = Some(stats.max.map_or(v, |m| m.max(v)));
            sum += v;
            stats.samples += 1;
        }
        if stats.samples > 0 {
            stats.avg = Some(sum / stats.samples as f64);
        }
        stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricSummary {
    /// Normalized value of the newest point
    pub current: Option<f64>,
    pub hour: WindowStats,
    pub day: WindowStats,
}

impl MetricSummary {
    /// Summarises `points` (any order) as seen at `now`
    pub fn compute(points: &[DataPoint], now: DateTime<Utc>) -> Self {
        let window = |span: Duration| {
            let since = now - span;
            WindowStats::compute(
                points
                    .iter()
                    .filter(|p| p.timestamp >= since && p.timestamp <= now)
                    .filter_map(DataPoint::value),
            )
        };

        Self {
            current: points
                .iter()
                .max_by_key(|p| p.timestamp)
                .and_then(DataPoint::value),
            hour: window(Duration::hours(1)),
            day: window(Duration::days(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_and_day_windows() {
        let now = Utc::now();
        let points = vec![
            DataPoint::numeric(now - Duration::hours(5), 80.0),
            DataPoint::numeric(now - Duration::minutes(30), 20.0),
            DataPoint::numeric(now - Duration::minutes(5), 40.0),
            DataPoint::numeric(now - Duration::days(2), 100.0),
        ];

        let summary = MetricSummary::compute(&points, now);
        assert_eq!(summary.current, Some(40.0));
        assert_eq!(summary.hour.samples, 2);
        assert_eq!(summary.hour.min, Some(20.0));
        assert_eq!(summary.hour.avg, Some(30.0));
        assert_eq!(summary.day.samples, 3);
        assert_eq!(summary.day.max, Some(80.0));
    }

    #[test]
    fn test_failed_pings_have_no_value() {
        let now = Utc::now();
        let points = vec![
            DataPoint::ping(now - Duration::minutes(2), 30, true),
            DataPoint::ping(now - Duration::minutes(1), 0, false),
        ];
        let summary = MetricSummary::compute(&points, now);
        assert_eq!(summary.current, None);
        assert_eq!(summary.hour.samples, 1);
        assert_eq!(summary.hour.avg, Some(30.0));
    }

    #[test]
    fn test_empty_summary() {
        let summary = MetricSummary::compute(&[], Utc::now());
        assert_eq!(summary, MetricSummary::default());
    }
}
