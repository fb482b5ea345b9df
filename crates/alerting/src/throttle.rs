//! Per-severity cooldown

use crate::config::Frequencies;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use storage::NotificationSeverity;
use tracing::debug;

/// Tracks the last accepted instant for each severity tier
pub struct SeverityThrottle {
    frequencies: Frequencies,
    last_accepted: Mutex<HashMap<NotificationSeverity, Instant>>,
}

impl SeverityThrottle {
    pub fn new(frequencies: Frequencies) -> Self {
        Self {
            frequencies,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    /// Claims the tier's slot at `now` if its cooldown has elapsed.
    /// The check and the claim happen under one lock.
    pub fn try_acquire(&self, severity: NotificationSeverity, now: Instant) -> bool {
        let cooldown = self.frequencies.for_severity(severity);
        // A poisoned map only holds instants; keep using it
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = last.get(&severity) {
            if now.saturating_duration_since(*previous) < cooldown {
                debug!(severity = %severity, "Notification suppressed: in cooldown period");
                return false;
            }
        }
        last.insert(severity, now);
        true
    }

    /// Gives back a slot claimed at `claimed_at`, e.g. when persisting failed
    pub fn release(&self, severity: NotificationSeverity, claimed_at: Instant) {
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if last.get(&severity) == Some(&claimed_at) {
            last.remove(&severity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn throttle() -> SeverityThrottle {
        SeverityThrottle::new(Frequencies {
            low: 300,
            medium: 60,
            high: 10,
        })
    }

    #[test]
    fn test_cooldown_per_severity() {
        let throttle = throttle();
        let start = Instant::now();

        assert!(throttle.try_acquire(NotificationSeverity::High, start));
        assert!(!throttle.try_acquire(NotificationSeverity::High, start + Duration::from_secs(9)));
        // Other tiers are independent
        assert!(throttle.try_acquire(NotificationSeverity::Low, start + Duration::from_secs(9)));
        assert!(throttle.try_acquire(NotificationSeverity::High, start + Duration::from_secs(10)));
    }

    #[test]
    fn test_dropped_requests_do_not_extend_cooldown() {
        let throttle = throttle();
        let start = Instant::now();

        assert!(throttle.try_acquire(NotificationSeverity::Medium, start));
        assert!(!throttle.try_acquire(NotificationSeverity::Medium, start + Duration::from_secs(59)));
        assert!(throttle.try_acquire(NotificationSeverity::Medium, start + Duration::from_secs(60)));
    }

    #[test]
    fn test_release_restores_slot() {
        let throttle = throttle();
        let start = Instant::now();

        assert!(throttle.try_acquire(NotificationSeverity::Low, start));
        throttle.release(NotificationSeverity::Low, start);
        assert!(throttle.try_acquire(NotificationSeverity::Low, start + Duration::from_secs(1)));
    }
}
