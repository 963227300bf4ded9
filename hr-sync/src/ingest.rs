use crate::pagination::fetch_all;
use config::{HrSourceConfig, IngestMode, QueueConfig};
use errors::{TransportError, UpstreamError};
use futures_util::StreamExt;
use hcp_core::{EmployeeRecord, EmployeeSource, IngestMessage, MessagePublisher, Page, StageMessage};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub date: String,
    pub pages_published: u32,
    pub total_pages: u32,
    pub total_records: u64,
    pub messages_published: u64,
    pub skipped_records: u64
}

#[derive(Debug, Error)]
pub enum IngestFailure {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error)
}

/// A run that stopped early. Pages counted in `published` are already on
/// the queue.
#[derive(Debug, Error)]
#[error("ingestion stopped after {} page(s): {source}", published.pages_published)]
pub struct IngestError {
    pub published: IngestReport,
    pub source: IngestFailure
}

/// Fans HR pages out into the queues.
pub struct IngestService {
    source: Arc<dyn EmployeeSource>,
    publisher: Arc<dyn MessagePublisher>,
    queues: QueueConfig,
    mode: IngestMode
}

impl IngestService {
    pub fn new(
        source: Arc<dyn EmployeeSource>,
        publisher: Arc<dyn MessagePublisher>,
        queues: QueueConfig,
        mode: IngestMode
    ) -> Self {
        Self {
            source,
            publisher,
            queues,
            mode
        }
    }

    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    /// Fetch every page for `date` and publish each one before fetching the
    /// next.
    pub async fn run(&self, date: &str) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport {
            date: date.to_string(),
            ..Default::default()
        };
        info!(date = %date, mode = ?self.mode, "Starting ingestion");

        let mut pages = std::pin::pin!(fetch_all(self.source.as_ref(), date));

        while let Some(next) = pages.next().await {
            let page = match next {
                Ok(page) => page,
                Err(e) => return Err(self.stopped(report, e.into()))
            };

            if report.pages_published == 0 {
                report.total_pages = page.pagination.last_page.max(1);
                report.total_records = page.pagination.total;
            }

            if let Err(e) = self.publish_page(&page, &mut report).await {
                return Err(self.stopped(report, e));
            }

            report.pages_published += 1;
            metrics::counter!("hcp_sync_ingest_pages_total").increment(1);
            debug!(
                page = page.pagination.current_page,
                last_page = report.total_pages,
                records = page.record_count(),
                "Page published"
            );
        }

        info!(
            date = %date,
            pages = report.pages_published,
            messages = report.messages_published,
            skipped = report.skipped_records,
            "Ingestion completed"
        );
        Ok(report)
    }

    fn stopped(&self, published: IngestReport, source: IngestFailure) -> IngestError {
        warn!(
            pages_published = published.pages_published,
            error = %source,
            "Ingestion stopped"
        );
        IngestError { published, source }
    }

    async fn publish_page(
        &self,
        page: &Page,
        report: &mut IngestReport
    ) -> Result<(), IngestFailure> {
        match self.mode {
            IngestMode::Legacy => {
                let message = IngestMessage::sync(serde_json::to_value(page)?);
                let body = serde_json::to_vec(&message)?;
                self.publisher.publish(&self.queues.ingest, &body).await?;
                report.messages_published += 1;
            }
            IngestMode::Staged => {
                for raw in &page.data {
                    let record = match EmployeeRecord::from_value(raw.clone()) {
                        Ok(record) => record,
                        Err(e) => {
                            warn!(
                                page = page.pagination.current_page,
                                error = %e,
                                "Skipping undecodable HR record"
                            );
                            report.skipped_records += 1;
                            continue;
                        }
                    };

                    let body = StageMessage::CreatePerson(record).to_bytes()?;
                    self.publisher
                        .publish(&self.queues.create_person, &body)
                        .await?;
                    report.messages_published += 1;
                }
            }
        }
        Ok(())
    }
}

/// The date a sync run filters on: the requested one, else the configured
/// default, else today (UTC).
pub fn sync_date(requested: Option<&str>, config: &HrSourceConfig) -> String {
    requested
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| config.default_date.clone())
        .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string())
}
