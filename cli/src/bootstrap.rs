//! Process bootstrap shared by the subcommands: configuration, tracing,
//! metrics, broker and collaborator wiring.

use access_control::{ArtemisClient, HttpPhotoFetcher};
use anyhow::{Context, Result};
use config::{Config, ObservabilityConfig, Role};
use hcp_core::Broker;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use pipeline::{Collaborators, shutdown_signal};
use queue::{MemoryBroker, RedisBroker};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::commands::{BrokerKind, GlobalArgs};

/// Loads the configuration and installs the tracing subscriber.
///
/// No role checks yet; see [`prepare`].
pub fn load(global: &GlobalArgs) -> Result<Config> {
    let config = config::load(global.config.as_deref()).with_context(|| match &global.config {
        Some(path) => format!("failed to load configuration from {}", path.display()),
        None => "failed to load configuration from the environment".to_string()
    })?;
    init_tracing(&config.observability);
    Ok(config)
}

/// [`load`], then reject the configuration if `role` cannot run with it.
pub fn prepare(global: &GlobalArgs, role: Role) -> Result<Config> {
    let config = load(global)?;
    config
        .validate_for(role)
        .with_context(|| format!("configuration is not usable for {role:?}"))?;
    Ok(config)
}

/// `RUST_LOG` wins; otherwise `observability.log_level`. Logs go to stderr
/// so command output on stdout stays machine readable.
fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    let (plain, json) = if observability.json_logs {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(plain)
        .with(json)
        .with(filter)
        .init();
}

/// Installs the global Prometheus recorder when metrics are enabled. The
/// handle renders the `/metrics` page.
pub fn install_metrics(observability: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    if !observability.metrics_enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install the Prometheus recorder")?;
    Ok(Some(handle))
}

/// Worker processes have no router of their own, so the exporter serves
/// `/metrics` on `0.0.0.0:{metrics_port}`.
pub fn serve_metrics(observability: &ObservabilityConfig) -> Result<Option<SocketAddr>> {
    if !observability.metrics_enabled {
        return Ok(None);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], observability.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to start the metrics listener on {addr}"))?;

    tracing::info!(%addr, "Metrics listener started");
    Ok(Some(addr))
}

pub fn open_broker(kind: BrokerKind, config: &Config) -> Result<Arc<dyn Broker>> {
    match kind {
        BrokerKind::Redis => {
            let broker = RedisBroker::from_config(&config.broker, &config.queues)?;
            tracing::info!(broker = %config.broker.display_addr(), "Using Redis Streams broker");
            Ok(Arc::new(broker))
        }
        BrokerKind::Memory => {
            tracing::warn!("Using the in-process broker; queued messages are lost on exit");
            Ok(Arc::new(MemoryBroker::new(
                config.queues.dead_letter_suffix.clone()
            )))
        }
    }
}

/// Access-control client, photo fetcher and zone table for the workers.
pub fn collaborators(config: &Config) -> Result<Collaborators> {
    let access = ArtemisClient::new(config.access_control.clone(), config.person.clone())
        .context("failed to build the access-control client")?;
    let photos = HttpPhotoFetcher::new(
        Duration::from_secs(config.access_control.photo_timeout_seconds),
        config.access_control.accept_invalid_certs
    )
    .context("failed to build the photo fetcher")?;

    Ok(Collaborators {
        access: Arc::new(access),
        photos: Arc::new(photos),
        zones: Arc::new(config.zones.clone()),
        queues: config.queues.clone()
    })
}

/// One Ctrl+C / SIGTERM fanned out to every component of the process.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>
}

impl Shutdown {
    /// Starts listening for the process signals.
    pub fn on_signal() -> Self {
        let (tx, _) = watch::channel(false);
        let shutdown = Self { tx: Arc::new(tx) };

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.trigger();
        });

        shutdown
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Resolves once [`Shutdown::trigger`] ran, including before the call.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            if !*rx.borrow() {
                // An error means every sender is gone; nothing can trigger anymore.
                let _ = rx.changed().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn global(config: Option<PathBuf>) -> GlobalArgs {
        GlobalArgs {
            config,
            broker: BrokerKind::Memory
        }
    }

    #[tokio::test]
    async fn test_shutdown_reaches_every_waiter() {
        let (tx, _) = watch::channel(false);
        let shutdown = Shutdown { tx: Arc::new(tx) };

        let first = tokio::spawn(shutdown.wait());
        let second = tokio::spawn(shutdown.wait());
        shutdown.trigger();

        first.await.unwrap();
        second.await.unwrap();
        // Waiters created after the trigger resolve immediately.
        shutdown.wait().await;
    }

    #[test]
    fn test_disabled_metrics_start_nothing() {
        let observability = ObservabilityConfig {
            metrics_enabled: false,
            ..Default::default()
        };
        assert!(install_metrics(&observability).unwrap().is_none());
        assert!(serve_metrics(&observability).unwrap().is_none());
    }

    // The only test in this binary that installs the global recorder.
    #[tokio::test]
    async fn test_worker_metrics_listener_answers_scrapes() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let observability = ObservabilityConfig {
            metrics_port: port,
            ..Default::default()
        };
        serve_metrics(&observability).unwrap();

        let request = b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        let mut response = String::new();
        for _ in 0..50 {
            if let Ok(mut stream) = tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
                stream.write_all(request).await.unwrap();
                stream.read_to_string(&mut response).await.unwrap();
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    }

    #[tokio::test]
    async fn test_memory_broker_probes() {
        let broker = open_broker(BrokerKind::Memory, &Config::default()).unwrap();
        broker.probe().await.unwrap();
    }

    #[test]
    fn test_collaborators_from_default_config() {
        let collaborators = collaborators(&Config::default()).unwrap();
        assert_eq!(collaborators.queues.ingest, "hikvision_queue");
        assert_eq!(collaborators.zones.get("kawasan"), Some("9"));
    }

    #[test]
    fn test_missing_config_file_names_path() {
        let err = load(&global(Some(PathBuf::from("/nonexistent/hcp.toml")))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hcp.toml"));
    }

    #[test]
    fn test_worker_role_needs_access_control_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[server]\nport = 8088\n").unwrap();

        let err = prepare(&global(Some(file.path().to_path_buf())), Role::Worker).unwrap_err();
        assert!(format!("{err:#}").contains("access_control"));
    }
}
