//! Error types for the trigger API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response}
};
use errors::{MessageError, TransportError};
use hr_sync::IngestError;
use serde::Serialize;
use thiserror::Error;

/// Failures a trigger request can end with.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Empty, falsy or non-JSON request body.
    #[error("Invalid payload")]
    InvalidPayload,

    /// Body is JSON but not a usable employee record.
    #[error(transparent)]
    Malformed(#[from] MessageError),

    /// The broker did not accept the message.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Paginated ingestion stopped early.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error)
}

/// Server lifecycle failures.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Server error: {0}")]
    Serve(String)
}

/// Error response body for HTTP endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidPayload | Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Transport(e) => {
                tracing::error!(error = %e, "Broker rejected message");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Ingest(e) => {
                tracing::error!(
                    pages_published = e.published.pages_published,
                    error = %e.source,
                    "Ingestion endpoint failed"
                );
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Serialization(e) => {
                tracing::error!(error = %e, "Serialization error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorResponse {
            error: self.to_string()
        };
        (status, Json(body)).into_response()
    }
}
