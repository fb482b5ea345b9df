//! Per-source admission history

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Admission instants for one source, oldest first, never longer than the limit
#[derive(Debug)]
pub(crate) struct SourceWindow {
    admitted: VecDeque<Instant>,
    capacity: usize,
    /// Set once a rejection has been reported for the current saturation
    rejection_reported: bool,
}

pub(crate) enum Decision {
    Admit,
    Reject {
        retry_after: Duration,
        first_rejection: bool,
    },
}

impl SourceWindow {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            admitted: VecDeque::with_capacity(capacity),
            capacity,
            rejection_reported: false,
        }
    }

    /// Drops admissions that have aged out of the window
    pub(crate) fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    pub(crate) fn decide(&mut self, now: Instant, window: Duration) -> Decision {
        self.evict(now, window);

        if self.admitted.len() >= self.capacity {
            let oldest = self.admitted.front().copied().unwrap_or(now);
            let retry_after = window.saturating_sub(now.saturating_duration_since(oldest));
            let first_rejection = !self.rejection_reported;
            self.rejection_reported = true;
            return Decision::Reject {
                retry_after,
                first_rejection,
            };
        }

        // Non-decreasing, so eviction can stop at the first fresh entry
        let at = self.admitted.back().map_or(now, |&last| last.max(now));
        self.admitted.push_back(at);
        self.rejection_reported = false;
        Decision::Admit
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.admitted.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.admitted.len()
    }
}
