//! Pure anomaly checks over one scan window

use chrono::{DateTime, Duration, Utc};
use storage::DataPoint;

/// One offending stretch found in the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offense {
    pub first_offense: DateTime<Utc>,
    /// Still in progress at the end of the window
    pub ongoing: bool,
    /// Starts at the first point of the window, so it may have begun earlier
    pub truncated: bool,
}

/// Everything one check found in the window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Findings {
    /// Oldest first
    pub offenses: Vec<Offense>,
    /// The trailing condition is developing but has not crossed its limit
    pub suspect: bool,
}

/// Gaps in `timestamps` (oldest first) and the silence after the newest one.
/// A gap is offending once it is longer than `max_difference` and is keyed by
/// the point before it; a trailing silence past half of it is suspect.
pub fn find_gaps(
    timestamps: &[DateTime<Utc>],
    now: DateTime<Utc>,
    max_difference: Duration,
) -> Findings {
    let mut findings = Findings::default();
    let Some(&latest) = timestamps.last() else {
        return findings;
    };

    findings.offenses = timestamps
        .windows(2)
        .filter(|pair| pair[1] - pair[0] > max_difference)
        .map(|pair| Offense {
            first_offense: pair[0],
            ongoing: false,
            truncated: false,
        })
        .collect();

    let elapsed = now - latest;
    if elapsed > max_difference {
        findings.offenses.push(Offense {
            first_offense: latest,
            ongoing: true,
            truncated: false,
        });
    } else if elapsed * 2 > max_difference {
        findings.suspect = true;
    }
    findings
}

/// Runs of points matching `bad` in `points` (oldest first).
/// A run longer than `max_failures` is offending from its first point; a
/// shorter run at the end of the window is suspect.
pub fn find_runs(
    points: &[DataPoint],
    max_failures: usize,
    bad: impl Fn(&DataPoint) -> bool,
) -> Findings {
    let mut findings = Findings::default();
    let mut start = 0;
    let mut len = 0;

    for (i, point) in points.iter().enumerate() {
        if bad(point) {
            if len == 0 {
                start = i;
            }
            len += 1;
            continue;
        }
        if len > max_failures {
            findings.offenses.push(Offense {
                first_offense: points[start].timestamp,
                ongoing: false,
                truncated: start == 0,
            });
        }
        len = 0;
    }

    if len > max_failures {
        findings.offenses.push(Offense {
            first_offense: points[start].timestamp,
            ongoing: true,
            truncated: start == 0,
        });
    } else if len > 0 {
        findings.suspect = true;
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<DataPoint> {
        let start = Utc::now() - Duration::minutes(values.len() as i64);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DataPoint::numeric(start + Duration::minutes(i as i64), *v))
            .collect()
    }

    fn high(p: &DataPoint) -> bool {
        p.value().map_or(false, |v| v >= 90.0)
    }

    #[test]
    fn test_trailing_gap_states() {
        let now = Utc::now();
        let max = Duration::seconds(300);

        assert_eq!(find_gaps(&[], now, max), Findings::default());
        assert_eq!(
            find_gaps(&[now - Duration::seconds(60)], now, max),
            Findings::default()
        );
        assert!(find_gaps(&[now - Duration::seconds(200)], now, max).suspect);

        let latest = now - Duration::seconds(301);
        let findings = find_gaps(&[latest], now, max);
        assert_eq!(
            findings.offenses,
            vec![Offense {
                first_offense: latest,
                ongoing: true,
                truncated: false
            }]
        );
        // Exactly at the limit is not yet a gap
        let findings = find_gaps(&[now - max], now, max);
        assert!(findings.offenses.is_empty());
        assert!(findings.suspect);
    }

    #[test]
    fn test_gaps_inside_the_window() {
        let now = Utc::now();
        let max = Duration::seconds(300);
        let at = |mins: i64| now - Duration::minutes(mins);
        let timestamps = [at(40), at(39), at(30), at(29), at(20), at(1)];

        let findings = find_gaps(&timestamps, now, max);
        let starts: Vec<_> = findings.offenses.iter().map(|o| o.first_offense).collect();
        assert_eq!(starts, vec![at(39), at(29), at(20)]);
        assert!(findings.offenses.iter().all(|o| !o.ongoing));
        assert!(!findings.suspect);
    }

    #[test]
    fn test_every_run_in_the_window() {
        let points = series(&[10.0, 95.0, 95.0, 95.0, 95.0, 10.0, 92.0, 10.0, 91.0, 99.0, 93.0, 94.0]);
        let findings = find_runs(&points, 3, high);

        assert_eq!(
            findings.offenses,
            vec![
                Offense {
                    first_offense: points[1].timestamp,
                    ongoing: false,
                    truncated: false
                },
                Offense {
                    first_offense: points[8].timestamp,
                    ongoing: true,
                    truncated: false
                },
            ]
        );
        assert!(!findings.suspect);
    }

    #[test]
    fn test_short_trailing_run_is_suspect() {
        let points = series(&[10.0, 95.0, 95.0]);
        let findings = find_runs(&points, 3, high);
        assert!(findings.offenses.is_empty());
        assert!(findings.suspect);

        assert_eq!(find_runs(&series(&[95.0, 10.0]), 3, high), Findings::default());
        assert_eq!(find_runs(&[], 3, high), Findings::default());
    }

    #[test]
    fn test_run_at_window_start_is_truncated() {
        let points = series(&[95.0, 95.0, 95.0, 95.0, 10.0]);
        let findings = find_runs(&points, 3, high);
        assert_eq!(findings.offenses.len(), 1);
        assert!(findings.offenses[0].truncated);
        assert!(!findings.offenses[0].ongoing);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let points = series(&[90.0, 90.0]);
        assert_eq!(find_runs(&points, 1, high).offenses.len(), 1);
    }
}
