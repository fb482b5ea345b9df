//! Service Manager Implementation

use crate::config::ServiceSchedule;
use crate::task::PeriodicTask;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Tick,
    Wake,
}

/// Owns the background services and their shutdown signal
pub struct ServiceManager {
    services: Vec<(Arc<dyn PeriodicTask>, Duration)>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ServiceManager {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            services: Vec::new(),
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Adds a service. Disabled services and zero intervals are skipped.
    pub fn register(&mut self, task: Arc<dyn PeriodicTask>, schedule: ServiceSchedule) {
        if !schedule.enabled {
            info!(service = task.name(), "Service disabled");
            return;
        }
        if schedule.interval == 0 {
            warn!(service = task.name(), "Service has a zero interval, not starting it");
            return;
        }
        self.services.push((task, schedule.interval()));
    }

    /// Number of services that will run
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn service_names(&self) -> Vec<&'static str> {
        self.services.iter().map(|(task, _)| task.name()).collect()
    }

    /// Spawns one tokio task per registered service
    pub fn start(&mut self) {
        for (task, period) in self.services.drain(..) {
            let shutdown = self.shutdown.subscribe();
            self.handles
                .push(tokio::spawn(run_service(task, period, shutdown)));
        }
        info!(services = self.handles.len(), "Service manager started");
    }

    /// Signals every service to stop and waits for them. In-flight runs are abandoned.
    pub async fn shutdown(mut self) {
        info!("Stopping services");
        let _ = self.shutdown.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Service task panicked: {}", e);
            }
        }
        info!("All services stopped");
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_service(
    task: Arc<dyn PeriodicTask>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = task.name();
    info!(service = name, interval_secs = period.as_secs(), "Service started");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let wake = task.wake_signal();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let trigger = {
            let woken = async {
                match &wake {
                    Some(signal) => signal.notified().await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => Trigger::Tick,
                _ = woken => Trigger::Wake,
            }
        };

        let run = async {
            match trigger {
                Trigger::Tick => task.tick().await,
                Trigger::Wake => task.on_wake().await,
            }
        };

        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!(service = name, "Abandoning in-flight run");
                break;
            }
            result = timeout(period, run) => match result {
                Ok(Ok(())) => debug!(service = name, trigger = ?trigger, "Service run complete"),
                Ok(Err(e)) => error!(service = name, "Service run failed: {:#}", e),
                Err(_) => warn!(
                    service = name,
                    timeout_secs = period.as_secs(),
                    "Service run timed out"
                ),
            }
        }
    }

    info!(service = name, "Service stopped");
}
