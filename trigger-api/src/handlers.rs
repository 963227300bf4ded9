//! HTTP request handlers for the trigger API.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse
};
use hcp_core::{EmployeeRecord, IngestMessage, StageMessage};
use hr_sync::sync_date;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub status: &'static str,
    pub message: String
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub message: String,
    pub date: String,
    pub pages: u32,
    pub records: u64,
    pub messages: u64
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub broker: &'static str
}

#[derive(Debug, Default, Deserialize)]
pub struct IngestQuery {
    pub date: Option<String>
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` carry nothing
/// worth queueing.
fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty()
    }
}

/// POST /send-to-hikvision
///
/// Queues the request body unmodified under `data` on the ingestion queue.
pub async fn send_to_hikvision(
    State(state): State<Arc<AppState>>,
    body: Bytes
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let payload: Value = serde_json::from_slice(&body).map_err(|_| ApiError::InvalidPayload)?;
    if is_empty_payload(&payload) {
        return Err(ApiError::InvalidPayload);
    }

    let message = serde_json::to_vec(&IngestMessage::sync(payload))?;
    state.publisher.publish(&state.queues.ingest, &message).await?;
    tracing::info!(queue = %state.queues.ingest, bytes = message.len(), "Payload queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            status: "queued",
            message: "Data sent to queue".to_string()
        })
    ))
}

/// POST /eposh-induction[?date=YYYY-MM-DD]
///
/// Runs a full paginated ingestion inside the request.
pub async fn eposh_induction(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IngestQuery>
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let date = sync_date(query.date.as_deref(), &state.hr_source);
    let report = state.ingest.run(&date).await?;

    let queue = match state.ingest.mode() {
        config::IngestMode::Legacy => &state.queues.ingest,
        config::IngestMode::Staged => &state.queues.create_person
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            status: "queued",
            message: format!(
                "All {} pages ({} employees) sent to {} for processing",
                report.total_pages, report.total_records, queue
            ),
            date: report.date,
            pages: report.pages_published,
            records: report.total_records,
            messages: report.messages_published
        })
    ))
}

/// POST /employees
///
/// Enters one typed employee record straight into the create-person stage.
pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    body: Bytes
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let value: Value = serde_json::from_slice(&body).map_err(|_| ApiError::InvalidPayload)?;
    let employee = EmployeeRecord::from_value(value)?;
    let person_code = employee.identity_number.clone();

    let message = StageMessage::CreatePerson(employee).to_bytes()?;
    state
        .publisher
        .publish(&state.queues.create_person, &message)
        .await?;
    tracing::info!(person_code = %person_code, "Employee queued for creation");

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            status: "queued",
            message: format!("Employee {person_code} queued for creation")
        })
    ))
}

/// Health check endpoint.
///
/// Returns 200 when the broker answers the probe.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = state.broker.probe().await {
        tracing::warn!(error = %e, "Broker health check failed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy",
                broker: "disconnected"
            })
        );
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            broker: "connected"
        })
    )
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled\n".to_string())
    }
}
