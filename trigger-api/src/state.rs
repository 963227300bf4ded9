//! Application state for the trigger API.

use config::{Config, HrSourceConfig, QueueConfig};
use errors::TransportError;
use hcp_core::{Broker, EmployeeSource, MessagePublisher};
use hr_sync::IngestService;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared state of the HTTP handlers.
pub struct AppState {
    /// Probed by `/health`.
    pub broker: Arc<dyn Broker>,
    /// Publisher of the HTTP side; workers never share it.
    pub publisher: Arc<dyn MessagePublisher>,
    pub ingest: IngestService,
    pub queues: QueueConfig,
    pub hr_source: HrSourceConfig,
    /// `None` when metrics are disabled.
    pub metrics: Option<PrometheusHandle>
}

impl AppState {
    /// Opens the API's own publisher and wires the ingestion service to it.
    pub async fn new(
        config: &Config,
        broker: Arc<dyn Broker>,
        source: Arc<dyn EmployeeSource>,
        metrics: Option<PrometheusHandle>
    ) -> Result<Self, TransportError> {
        let publisher: Arc<dyn MessagePublisher> = Arc::from(broker.publisher().await?);
        let ingest = IngestService::new(
            source,
            Arc::clone(&publisher),
            config.queues.clone(),
            config.ingest.mode
        );

        Ok(Self {
            broker,
            publisher,
            ingest,
            queues: config.queues.clone(),
            hr_source: config.hr_source.clone(),
            metrics
        })
    }
}
