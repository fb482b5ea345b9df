//! HTTP availability probes

use crate::config::{PingConfig, PingTarget};
use crate::task::PeriodicTask;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use data_validator::Validator;
use labeling::LabelEngine;
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Instant;
use storage::{DataPoint, MetricKey, MetricType, Payload, Repository};
use tracing::{debug, error, warn};

struct Probe {
    target: PingTarget,
    url: Url,
    key: MetricKey,
}

/// Probes each configured server and records a Ping data point under its host name
pub struct PingService {
    repository: Arc<dyn Repository>,
    labels: Arc<LabelEngine>,
    client: Client,
    probes: Vec<Probe>,
}

impl PingService {
    /// Fails when a target URL cannot be parsed or its host is not a valid metric source
    pub fn new(
        repository: Arc<dyn Repository>,
        labels: Arc<LabelEngine>,
        config: &PingConfig,
    ) -> anyhow::Result<Self> {
        // Same rules the metric endpoints apply, so every ping metric stays addressable
        let validator = Validator::default();
        let probes = config
            .targets
            .iter()
            .map(|target| -> anyhow::Result<Probe> {
                let url = Url::parse(&target.url)
                    .with_context(|| format!("Invalid ping target '{}'", target.url))?;
                let host = url
                    .host_str()
                    .ok_or_else(|| anyhow!("Ping target '{}' has no host", target.url))?
                    .to_string();
                validator.validate_source(&host).with_context(|| {
                    format!("Ping target '{}' is not usable as a metric source", target.url)
                })?;
                Ok(Probe {
                    target: target.clone(),
                    url,
                    key: MetricKey::new(MetricType::Ping, host),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            repository,
            labels,
            client,
            probes,
        })
    }

    /// Host names whose availability is recorded
    pub fn sources(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.key.source.as_str()).collect()
    }

    async fn probe(&self, probe: &Probe) -> DataPoint {
        let request = if probe.target.get_method_required {
            self.client.get(probe.url.clone())
        } else {
            self.client.head(probe.url.clone())
        };

        let started = Instant::now();
        let result = tokio::time::timeout(probe.target.max_response_time(), request.send()).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (success, message) = match result {
            Ok(Ok(response)) if response.status().is_success() => (true, None),
            Ok(Ok(response)) => (false, Some(format!("HTTP {}", response.status().as_u16()))),
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (
                false,
                Some(format!(
                    "No response within {} ms",
                    probe.target.max_response_time
                )),
            ),
        };

        if success {
            debug!(source = %probe.key.source, latency_ms, "Ping completed");
        } else {
            warn!(
                source = %probe.key.source,
                url = %probe.url,
                reason = message.as_deref().unwrap_or_default(),
                "Resource is unavailable"
            );
        }

        DataPoint::new(
            Utc::now(),
            Payload::Ping {
                latency_ms: if success { latency_ms } else { 0 },
                success,
                message,
            },
        )
    }

    /// Probes every target once and records the outcomes
    pub async fn ping_all(&self) -> anyhow::Result<usize> {
        let mut recorded = 0;
        for probe in &self.probes {
            let point = self.probe(probe).await;
            let failed = point.is_failure();
            let metric = match self.repository.append_point(&probe.key, point).await {
                Ok(metric) => metric,
                Err(e) => {
                    error!(source = %probe.key.source, "Failed to record ping: {}", e);
                    continue;
                }
            };
            metrics::counter!("pings_total", "success" => if failed { "false" } else { "true" })
                .increment(1);
            recorded += 1;
            if let Err(e) = self.labels.refresh(self.repository.as_ref(), &metric).await {
                error!(source = %probe.key.source, "Failed to refresh label: {}", e);
            }
        }
        Ok(recorded)
    }
}

#[async_trait]
impl PeriodicTask for PingService {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.ping_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use storage::MemoryRepository;

    async fn serve() -> SocketAddr {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                    "late"
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn service(repo: Arc<MemoryRepository>, targets: Vec<PingTarget>) -> PingService {
        PingService::new(
            repo,
            Arc::new(LabelEngine::default()),
            &PingConfig { targets },
        )
        .unwrap()
    }

    async fn latest(repo: &MemoryRepository, key: &MetricKey) -> Payload {
        repo.latest_points(key, 1).await.unwrap()[0].payload.clone()
    }

    #[test]
    fn test_rejects_target_without_host() {
        let result = PingService::new(
            Arc::new(MemoryRepository::new()),
            Arc::new(LabelEngine::default()),
            &PingConfig {
                targets: vec![PingTarget::new("not a url")],
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_hosts_the_api_cannot_address() {
        let long_host = format!("http://{}.example.com/", "a".repeat(40));
        for url in ["http://[::1]:8080/", long_host.as_str()] {
            let result = PingService::new(
                Arc::new(MemoryRepository::new()),
                Arc::new(LabelEngine::default()),
                &PingConfig {
                    targets: vec![PingTarget::new(url)],
                },
            );
            let err = result.err().expect("target should be rejected");
            assert!(format!("{:#}", err).contains("not usable as a metric source"), "{}", url);
        }
    }

    #[tokio::test]
    async fn test_records_success_under_host() {
        let addr = serve().await;
        let repo = Arc::new(MemoryRepository::new());
        let pinger = service(repo.clone(), vec![PingTarget::new(format!("http://{addr}/"))]);
        assert_eq!(pinger.sources(), vec!["127.0.0.1"]);

        assert_eq!(pinger.ping_all().await.unwrap(), 1);
        let key = MetricKey::new(MetricType::Ping, "127.0.0.1");
        assert!(matches!(latest(&repo, &key).await, Payload::Ping { success: true, .. }));
    }

    #[tokio::test]
    async fn test_error_status_and_slow_response_are_failures() {
        let addr = serve().await;
        let repo = Arc::new(MemoryRepository::new());
        let key = MetricKey::new(MetricType::Ping, "127.0.0.1");

        let broken = service(
            repo.clone(),
            vec![PingTarget {
                get_method_required: true,
                ..PingTarget::new(format!("http://{addr}/broken"))
            }],
        );
        broken.ping_all().await.unwrap();
        match latest(&repo, &key).await {
            Payload::Ping {
                success, message, ..
            } => {
                assert!(!success);
                assert_eq!(message.as_deref(), Some("HTTP 500"));
            }
            other => panic!("unexpected payload {other:?}"),
        }

        let slow = service(
            repo.clone(),
            vec![PingTarget {
                max_response_time: 100,
                ..PingTarget::new(format!("http://{addr}/slow"))
            }],
        );
        slow.ping_all().await.unwrap();
        assert!(matches!(
            latest(&repo, &key).await,
            Payload::Ping {
                success: false,
                latency_ms: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let repo = Arc::new(MemoryRepository::new());
        let pinger = service(repo.clone(), vec![PingTarget::new(format!("http://{addr}/"))]);
        pinger.ping_all().await.unwrap();

        let key = MetricKey::new(MetricType::Ping, "127.0.0.1");
        assert!(repo.latest_points(&key, 1).await.unwrap()[0].is_failure());
    }
}
