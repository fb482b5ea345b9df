//! Wiring of the repository, core components and background services

use crate::ingest::IngestService;
use crate::settings::Settings;
use crate::{create_router, AppState};
use alerting::{Dispatcher, LogTransport, NotificationScheduler, Transport, WebhookTransport};
use anyhow::Context;
use axum::Router;
use discrepancy::DiscrepancyDetector;
use guard::AdmissionGuard;
use labeling::LabelEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use service_manager::{
    CleanService, DiscrepancyTask, HealthService, NotificationTask, PingService, ServiceManager,
};
use std::sync::Arc;
use storage::Repository;
use tracing::info;

/// A fully assembled application: shared HTTP state plus the services that have not started yet
pub struct App {
    pub state: Arc<AppState>,
    pub services: ServiceManager,
    request_timeout: std::time::Duration,
}

impl App {
    /// Opens the configured repository and assembles everything on top of it
    pub async fn build(
        settings: &Settings,
        prometheus: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        let repository = storage::open(&settings.storage.url)
            .await
            .with_context(|| format!("Failed to open storage at '{}'", settings.storage.url))?;
        info!(url = %settings.storage.url, "Storage opened");
        Self::with_repository(settings, repository, prometheus)
    }

    pub fn with_repository(
        settings: &Settings,
        repository: Arc<dyn Repository>,
        prometheus: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        let services_config = &settings.service_manager;
        let notification_config = &services_config.notification_service.notifications;

        let labels = Arc::new(LabelEngine::new(settings.labels.clone()));
        let guard = Arc::new(AdmissionGuard::new(settings.guard.logging.clone()));
        let scheduler = Arc::new(NotificationScheduler::new(
            repository.clone(),
            notification_config,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            repository.clone(),
            build_transport(settings)?,
            notification_config,
        ));
        let detector = Arc::new(DiscrepancyDetector::new(
            repository.clone(),
            scheduler.clone(),
            services_config.discrepancy_service.detector.clone(),
        ));
        let ingest = Arc::new(IngestService::new(
            repository.clone(),
            guard,
            labels.clone(),
            scheduler.clone(),
            settings.logging.log_severity_reported,
        ));

        let mut services = ServiceManager::new();
        services.register(
            Arc::new(DiscrepancyTask::new(detector)),
            services_config.discrepancy_service.schedule,
        );
        services.register(
            Arc::new(NotificationTask::new(dispatcher, scheduler.wake_handle())),
            services_config.notification_service.schedule,
        );
        if services_config.ping_service.schedule.enabled {
            let ping = PingService::new(
                repository.clone(),
                labels.clone(),
                &services_config.ping_service.ping,
            )?;
            services.register(Arc::new(ping), services_config.ping_service.schedule);
        }
        services.register(
            Arc::new(CleanService::new(
                repository.clone(),
                services_config.clean_service.clean.clone(),
            )),
            services_config.clean_service.schedule,
        );
        services.register(
            Arc::new(HealthService::new(repository.clone())),
            services_config.health_service.schedule,
        );

        Ok(Self {
            state: Arc::new(AppState {
                repository,
                ingest,
                labels,
                prometheus,
            }),
            services,
            request_timeout: settings.server.request_timeout(),
        })
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone(), self.request_timeout)
    }
}

/// Posts to the webhook when one is configured, otherwise only logs.
/// Retries go through the same single transport.
fn build_transport(settings: &Settings) -> anyhow::Result<Arc<dyn Transport>> {
    match &settings.notifications.webhook_url {
        Some(url) => {
            let timeout = settings
                .service_manager
                .notification_service
                .notifications
                .send_timeout();
            let webhook = WebhookTransport::new(url.clone(), timeout)
                .context("Failed to build webhook transport")?;
            Ok(Arc::new(webhook))
        }
        None => Ok(Arc::new(LogTransport)),
    }
}
