//! Health report, uptime and badge

use serde::Serialize;
use storage::{AutoLabel, DataPoint, Metric, MetricKey, MetricType, Payload};

/// Source under which health snapshots are stored
pub const SYSTEM_HEALTH_SOURCE: &str = "system";

pub fn system_health_key() -> MetricKey {
    MetricKey::new(MetricType::Health, SYSTEM_HEALTH_SOURCE)
}

/// One public metric's contribution to the health report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthEntry {
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub source: String,
    pub label: AutoLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// Overall health, 0..=100
    pub health: u8,
    pub data: Vec<HealthEntry>,
}

impl HealthReport {
    /// Builds the report from public metrics only. Health snapshots do not count.
    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a Metric>) -> Self {
        let data: Vec<HealthEntry> = metrics
            .into_iter()
            .filter(|m| m.public && m.metric_type != MetricType::Health)
            .map(|m| HealthEntry {
                metric_type: m.metric_type,
                source: m.source.clone(),
                label: m.auto_label,
            })
            .collect();
        Self {
            health: health_percentage(data.iter().map(|e| e.label)),
            data,
        }
    }
}

fn label_score(label: AutoLabel) -> u32 {
    match label {
        AutoLabel::Normal => 100,
        AutoLabel::Warning => 50,
        AutoLabel::Critical => 0,
    }
}

/// Truncated mean of the label scores; 0 for an empty set
pub fn health_percentage(labels: impl IntoIterator<Item = AutoLabel>) -> u8 {
    let (total, count) = labels
        .into_iter()
        .fold((0u32, 0u32), |(total, count), l| (total + label_score(l), count + 1));
    if count == 0 {
        0
    } else {
        (total / count) as u8
    }
}

/// Rounded share of successful pings among `points`; 0 without any ping
pub fn uptime_percentage(points: &[DataPoint]) -> u8 {
    let (ok, total) = points
        .iter()
        .filter_map(|p| match p.payload {
            Payload::Ping { success, .. } => Some(success),
            _ => None,
        })
        .fold((0u32, 0u32), |(ok, total), success| {
            (ok + u32::from(success), total + 1)
        });
    if total == 0 {
        0
    } else {
        (f64::from(ok) * 100.0 / f64::from(total)).round() as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeStatus {
    Success,
    Neutral,
    Failure,
}

impl BadgeStatus {
    pub fn for_health(health: u8) -> Self {
        if health >= 100 {
            BadgeStatus::Success
        } else if health >= 70 {
            BadgeStatus::Neutral
        } else {
            BadgeStatus::Failure
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            BadgeStatus::Success => "#44cc11",
            BadgeStatus::Neutral => "#dfb317",
            BadgeStatus::Failure => "#e05d44",
        }
    }
}

/// Shields-style SVG badge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Badge {
    pub title: String,
    pub message: String,
    pub status: BadgeStatus,
}

impl Badge {
    pub fn health(health: u8) -> Self {
        Self {
            title: "health".to_string(),
            message: format!("{}%", health),
            status: BadgeStatus::for_health(health),
        }
    }

    pub fn render_svg(&self) -> String {
        // Approximate Verdana 11px advance width
        let width = |text: &str| 10 + text.chars().count() * 7;
        let left = width(&self.title);
        let right = width(&self.message);
        let total = left + right;
        format!(
            concat!(
                r##"<svg xmlns="http://www.w3.org/2000/svg" width="{total}" height="20" role="img" aria-label="{title}: {message}">"##,
                r##"<rect width="{left}" height="20" fill="#555"/>"##,
                r##"<rect x="{left}" width="{right}" height="20" fill="{color}"/>"##,
                r##"<g fill="#fff" text-anchor="middle" font-family="Verdana,Geneva,sans-serif" font-size="11">"##,
                r##"<text x="{title_x}" y="14">{title}</text>"##,
                r##"<text x="{message_x}" y="14">{message}</text>"##,
                "</g></svg>"
            ),
            total = total,
            left = left,
            right = right,
            color = self.status.color(),
            title = self.title,
            message = self.message,
            title_x = left / 2,
            message_x = left + right / 2,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storage::MetricKey;

    fn metric(source: &str, label: AutoLabel, public: bool) -> Metric {
        let mut m = Metric::new(&MetricKey::new(MetricType::CpuLoad, source), Utc::now());
        m.auto_label = label;
        m.public = public;
        m
    }

    #[test]
    fn test_health_mixed_labels() {
        let metrics = vec![
            metric("a", AutoLabel::Normal, true),
            metric("b", AutoLabel::Warning, true),
            metric("c", AutoLabel::Critical, true),
            metric("d", AutoLabel::Normal, true),
        ];
        let report = HealthReport::from_metrics(&metrics);
        assert_eq!(report.health, 62);
        assert_eq!(report.data.len(), 4);
    }

    #[test]
    fn test_private_metrics_are_excluded() {
        let metrics = vec![
            metric("a", AutoLabel::Normal, true),
            metric("b", AutoLabel::Critical, false),
        ];
        let report = HealthReport::from_metrics(&metrics);
        assert_eq!(report.health, 100);
        assert_eq!(report.data.len(), 1);
    }

    #[test]
    fn test_health_snapshots_do_not_count() {
        let mut snapshot = Metric::new(&system_health_key(), Utc::now());
        snapshot.auto_label = AutoLabel::Critical;
        let metrics = vec![metric("a", AutoLabel::Normal, true), snapshot];
        let report = HealthReport::from_metrics(&metrics);
        assert_eq!(report.health, 100);
        assert_eq!(report.data.len(), 1);
    }

    #[test]
    fn test_uptime_rounds_share_of_successful_pings() {
        let now = Utc::now();
        let pings = vec![
            DataPoint::ping(now, 10, true),
            DataPoint::ping(now, 10, true),
            DataPoint::ping(now, 0, false),
        ];
        assert_eq!(uptime_percentage(&pings), 67);
        assert_eq!(uptime_percentage(&pings[..2]), 100);
        assert_eq!(uptime_percentage(&[]), 0);
        assert_eq!(uptime_percentage(&[DataPoint::numeric(now, 5.0)]), 0);
    }

    #[test]
    fn test_empty_health_is_zero() {
        assert_eq!(health_percentage(Vec::new()), 0);
    }

    #[test]
    fn test_badge_status() {
        assert_eq!(BadgeStatus::for_health(100), BadgeStatus::Success);
        assert_eq!(BadgeStatus::for_health(70), BadgeStatus::Neutral);
        assert_eq!(BadgeStatus::for_health(69), BadgeStatus::Failure);

        let svg = Badge::health(62).render_svg();
        assert!(svg.contains("62%"));
        assert!(svg.contains("#e05d44"));
    }
}
