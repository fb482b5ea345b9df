//! Application settings
//!
//! Loaded from `config/default.toml`, an optional `config/{STATUS_ENV}.toml`
//! and `STATUS__*` environment variables, then validated once at startup.

use alerting::NotificationConfig;
use discrepancy::DetectorConfig;
use guard::GuardConfig;
use labeling::LabelConfig;
use serde::Deserialize;
use service_manager::{CleanConfig, PingConfig, ServiceSchedule};
use std::time::Duration;
use storage::LogSeverity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
    pub guard: GuardSettings,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub notifications: TransportSettings,
    pub service_manager: ServiceManagerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub address: String,
    /// Seconds before an HTTP request is cut off
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// `memory` or a `sqlite:` URL
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log messages at or above this severity raise a High notification
    pub log_severity_reported: LogSeverity,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardSettings {
    pub logging: GuardConfig,
}

/// Outbound channel for notifications. Without a webhook they are only logged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransportSettings {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceManagerSettings {
    pub discrepancy_service: DiscrepancyServiceSettings,
    pub notification_service: NotificationServiceSettings,
    pub ping_service: PingServiceSettings,
    pub clean_service: CleanServiceSettings,
    pub health_service: HealthServiceSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscrepancyServiceSettings {
    #[serde(flatten)]
    pub schedule: ServiceSchedule,
    #[serde(flatten)]
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationServiceSettings {
    #[serde(flatten)]
    pub schedule: ServiceSchedule,
    #[serde(flatten)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingServiceSettings {
    #[serde(flatten)]
    pub schedule: ServiceSchedule,
    #[serde(flatten)]
    pub ping: PingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthServiceSettings {
    #[serde(flatten)]
    pub schedule: ServiceSchedule,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanServiceSettings {
    #[serde(flatten)]
    pub schedule: ServiceSchedule,
    #[serde(flatten)]
    pub clean: CleanConfig,
}

impl Settings {
    /// Loads and validates settings from `dir`
    pub fn load_from(dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("STATUS_ENV").unwrap_or_else(|_| "development".to_string());
        let raw = config::Config::builder()
            .add_source(config::File::with_name(&format!("{dir}/default")))
            .add_source(config::File::with_name(&format!("{dir}/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("STATUS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(raw)
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Deserialises and validates an already assembled configuration
    pub fn from_config(raw: config::Config) -> Result<Self, ConfigError> {
        let settings: Settings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, reason: &str| ConfigError::Invalid {
            key,
            reason: reason.to_string(),
        };

        if self.guard.logging.requests == 0 {
            return Err(invalid("guard.logging.requests", "must be at least 1"));
        }
        if self.guard.logging.per_seconds == 0 {
            return Err(invalid("guard.logging.per_seconds", "must be at least 1"));
        }
        let services = &self.service_manager;
        let schedules = [
            ("service_manager.discrepancy_service.interval", &services.discrepancy_service.schedule),
            ("service_manager.notification_service.interval", &services.notification_service.schedule),
            ("service_manager.ping_service.interval", &services.ping_service.schedule),
            ("service_manager.clean_service.interval", &services.clean_service.schedule),
            ("service_manager.health_service.interval", &services.health_service.schedule),
        ];
        for (key, schedule) in schedules {
            if schedule.interval == 0 {
                return Err(invalid(key, "must be at least 1 second"));
            }
        }
        let detector = &services.discrepancy_service.detector;
        if detector.gaps.max_difference == 0 {
            return Err(invalid(
                "service_manager.discrepancy_service.gaps.max_difference",
                "must be at least 1 second",
            ));
        }
        if detector.data_timeframe == 0 {
            return Err(invalid(
                "service_manager.discrepancy_service.data_timeframe",
                "must be at least 1 second",
            ));
        }
        if !detector.load.threshold.is_finite() {
            return Err(invalid(
                "service_manager.discrepancy_service.load.threshold",
                "must be a finite number",
            ));
        }
        let runs = [
            ("service_manager.discrepancy_service.load.max_failures", detector.load.max_failures),
            ("service_manager.discrepancy_service.ping.max_failures", detector.ping.max_failures),
            ("service_manager.discrepancy_service.health.max_failures", detector.health.max_failures),
        ];
        for (key, max_failures) in runs {
            if max_failures == 0 {
                return Err(invalid(key, "must be at least 1"));
            }
        }
        if detector.health.threshold > 100 {
            return Err(invalid(
                "service_manager.discrepancy_service.health.threshold",
                "must be a percentage",
            ));
        }
        if self.server.request_timeout == 0 {
            return Err(invalid("server.request_timeout", "must be at least 1 second"));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                address: "127.0.0.1:8080".to_string(),
                request_timeout: default_request_timeout(),
            },
            storage: StorageSettings {
                url: "memory".to_string(),
            },
            logging: LoggingSettings {
                log_severity_reported: LogSeverity::Error,
                json: false,
            },
            guard: GuardSettings {
                logging: GuardConfig::default(),
            },
            labels: LabelConfig::default(),
            notifications: TransportSettings::default(),
            service_manager: ServiceManagerSettings {
                discrepancy_service: DiscrepancyServiceSettings {
                    schedule: ServiceSchedule::new(true, 60),
                    detector: DetectorConfig::default(),
                },
                notification_service: NotificationServiceSettings {
                    schedule: ServiceSchedule::new(true, 30),
                    notifications: NotificationConfig::default(),
                },
                ping_service: PingServiceSettings {
                    schedule: ServiceSchedule::new(false, 60),
                    ping: PingConfig::default(),
                },
                clean_service: CleanServiceSettings {
                    schedule: ServiceSchedule::new(true, 3_600),
                    clean: CleanConfig::default(),
                },
                health_service: HealthServiceSettings {
                    schedule: ServiceSchedule::new(true, 300),
                },
            },
        }
    }
}
