//! Operator-facing discrepancy text

use storage::{DiscrepancyKey, DiscrepancyType};

pub fn describe(key: &DiscrepancyKey) -> String {
    let at = key.date_first_offense.format("%Y-%m-%d %H:%M:%S UTC");
    match key.discrepancy_type {
        DiscrepancyType::DataGap => format!(
            "Gap in data from {} has been detected. The gap starts on {}.",
            key.metric_source, at
        ),
        DiscrepancyType::LoadSpike => {
            format!("{} reported high load starting from {}.", key.metric_source, at)
        }
        DiscrepancyType::RepeatedFailure => format!(
            "Requests to {} failed too many consecutive times. First failure occurred on {}.",
            key.metric_source, at
        ),
        DiscrepancyType::LowHealth => format!(
            "Health of {} stayed low for too long starting from {}.",
            key.metric_source, at
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use storage::MetricType;

    #[test]
    fn test_gap_message() {
        let key = DiscrepancyKey {
            discrepancy_type: DiscrepancyType::DataGap,
            metric_type: MetricType::CpuLoad,
            metric_source: "web-1".to_string(),
            date_first_offense: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
        };
        assert_eq!(
            describe(&key),
            "Gap in data from web-1 has been detected. The gap starts on 2024-05-01 08:30:00 UTC."
        );
    }
}
