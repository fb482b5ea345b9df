//! Admission Guard Implementation

use crate::config::GuardConfig;
use crate::window::{Decision, SourceWindow};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Idle windows are swept after this many checks
const SWEEP_EVERY: u64 = 1024;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// The source reached its limit. `first_rejection` is true for the first
    /// rejection since the source last had capacity.
    Rejected {
        retry_after: Duration,
        first_rejection: bool,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Per-source sliding-window limiter
pub struct AdmissionGuard {
    config: GuardConfig,
    windows: DashMap<String, SourceWindow>,
    checks: AtomicU64,
}

impl AdmissionGuard {
    pub fn new(config: GuardConfig) -> Self {
        info!(
            requests = config.requests,
            per_seconds = config.per_seconds,
            "Creating admission guard"
        );
        Self {
            config,
            windows: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Admission check at the current instant
    pub fn admit(&self, source: &str) -> Admission {
        self.admit_at(source, Instant::now())
    }

    /// Admission check at `now`. Admitted requests are recorded; rejected ones are not.
    pub fn admit_at(&self, source: &str, now: Instant) -> Admission {
        let window = self.config.window();
        let capacity = self.config.requests as usize;

        // The shard guard is dropped before any sweep below
        let decision = match self.windows.get_mut(source) {
            Some(mut entry) => entry.decide(now, window),
            None => self
                .windows
                .entry(source.to_owned())
                .or_insert_with(|| SourceWindow::new(capacity))
                .decide(now, window),
        };

        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(now);
        }

        match decision {
            Decision::Admit => {
                metrics::counter!("guard_admitted_total").increment(1);
                Admission::Admitted
            }
            Decision::Reject {
                retry_after,
                first_rejection,
            } => {
                metrics::counter!("guard_rejected_total").increment(1);
                debug!(
                    source = %source,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit exceeded"
                );
                Admission::Rejected {
                    retry_after,
                    first_rejection,
                }
            }
        }
    }

    /// Evicts stale admissions and forgets sources with nothing left in their window
    pub fn sweep(&self, now: Instant) {
        let window = self.config.window();
        let before = self.windows.len();
        self.windows.retain(|_, w| {
            w.evict(now, window);
            !w.is_idle()
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "Swept idle guard windows");
        }
    }

    /// Number of sources currently tracked
    pub fn tracked_sources(&self) -> usize {
        self.windows.len()
    }
}

impl Default for AdmissionGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}
