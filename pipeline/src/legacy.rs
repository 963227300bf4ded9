//! Single-stage worker for the ingestion queue.
//!
//! Consumes whole HR pages (`{event, data: {data: [...], pagination}}`) and
//! creates every person of the page in one go. Per-record failures are
//! logged and the batch is still acknowledged; only an unreadable envelope
//! is rejected. Deprecated in favour of the staged pipeline.

use crate::stages::{StageHandler, create_person};
use async_trait::async_trait;
use errors::{MessageError, TransportError};
use hcp_core::{AccessControl, Disposition, EmployeeRecord, IngestMessage, Pagination, PhotoSource};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct Batch {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    pagination: Option<Pagination>
}

/// Per-batch tally, logged once the batch is done.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub records: usize,
    pub created: usize,
    pub failed: usize
}

pub struct LegacyHandler {
    access: Arc<dyn AccessControl>,
    photos: Arc<dyn PhotoSource>
}

impl LegacyHandler {
    pub fn new(access: Arc<dyn AccessControl>, photos: Arc<dyn PhotoSource>) -> Self {
        Self { access, photos }
    }

    fn decode(body: &[u8]) -> Result<Batch, MessageError> {
        let message: IngestMessage =
            serde_json::from_slice(body).map_err(|e| MessageError::decode("ingest message", &e))?;
        serde_json::from_value(message.data).map_err(|e| MessageError::decode("HR page", &e))
    }

    /// Creates every record of the batch. Never fails as a whole.
    pub async fn process_batch(&self, records: Vec<Value>) -> BatchSummary {
        let mut summary = BatchSummary {
            records: records.len(),
            ..Default::default()
        };

        for raw in records {
            let outcome = match EmployeeRecord::from_value(raw) {
                Ok(employee) => {
                    create_person(self.access.as_ref(), self.photos.as_ref(), &employee)
                        .await
                        .map(|created| (employee, created))
                }
                Err(e) => Err(e.into())
            };

            match outcome {
                Ok((employee, created)) => {
                    summary.created += 1;
                    info!(
                        person_code = %employee.identity_number,
                        person_id = created.person_id.as_deref().unwrap_or(""),
                        "Employee sent to access control"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(kind = e.kind(), error = %e, "Failed to process employee");
                }
            }
        }

        summary
    }
}

#[async_trait]
impl StageHandler for LegacyHandler {
    fn name(&self) -> &'static str {
        "legacy"
    }

    async fn handle(&self, body: &[u8]) -> Result<Disposition, TransportError> {
        let batch = match Self::decode(body) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Unreadable batch rejected");
                return Ok(Disposition::dead_letter());
            }
        };

        if let Some(pagination) = batch.pagination {
            info!(
                page = pagination.current_page,
                last_page = pagination.last_page,
                records = batch.data.len(),
                "Received batch"
            );
        }

        let summary = self.process_batch(batch.data).await;
        info!(
            created = summary.created,
            failed = summary.failed,
            records = summary.records,
            "Batch completed"
        );
        Ok(Disposition::Ack)
    }
}
