//! # Sync Pipeline Errors
//!
//! Error taxonomy shared by every crate in the workspace.
//!
//! - [`UpstreamError`]: the HR source or the access-control platform answered
//!   with a failure status or a body we could not understand. Non-fatal; the
//!   message (or HTTP request) that triggered the call fails on its own.
//! - [`TransportError`]: the broker is unreachable or a connection broke.
//!   Fatal to the worker that hit it and must reach the orchestrator.
//! - [`MessageError`]: a queued payload is missing required fields or is not
//!   the shape its queue expects. Never retried.
//! - [`ConfigError`]: startup configuration is unusable.

use serde::Serialize;
use thiserror::Error;

/// Which external system an [`UpstreamError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Upstream {
    HrSource,
    AccessControl,
    Photo
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Upstream::HrSource => write!(f, "hr_source"),
            Upstream::AccessControl => write!(f, "access_control"),
            Upstream::Photo => write!(f, "photo")
        }
    }
}

/// Failure reported by (or while talking to) an external HTTP system.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{upstream} request failed: {reason}")]
    Request { upstream: Upstream, reason: String, retryable: bool },

    #[error("{upstream} returned HTTP {status}: {body}")]
    Status { upstream: Upstream, status: u16, body: String },

    #[error("{upstream} rejected the call with code {code}: {message}")]
    Platform { upstream: Upstream, code: String, message: String },

    #[error("{upstream} returned a malformed body: {reason}")]
    MalformedBody { upstream: Upstream, reason: String }
}

impl UpstreamError {
    pub fn upstream(&self) -> Upstream {
        match self {
            Self::Request { upstream, .. }
            | Self::Status { upstream, .. }
            | Self::Platform { upstream, .. }
            | Self::MalformedBody { upstream, .. } => *upstream
        }
    }

    /// Whether repeating the same call could succeed.
    ///
    /// Connection failures, timeouts, throttling and 5xx answers are
    /// transient. Everything else is a definitive answer from the upstream.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { retryable, .. } => *retryable,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Platform { .. } | Self::MalformedBody { .. } => false
        }
    }
}

/// Broker-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Broker connection failed ({broker}): {reason}")]
    Connection { broker: String, reason: String },

    #[error("Publish to queue {queue} failed: {reason}")]
    Publish { queue: String, reason: String },

    #[error("Consume from queue {queue} failed: {reason}")]
    Consume { queue: String, reason: String },

    #[error("Settling delivery {tag} on queue {queue} failed: {reason}")]
    Settle { queue: String, tag: String, reason: String },

    #[error("Queue {queue} is closed")]
    Closed { queue: String }
}

/// A queued payload that can never be processed successfully.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Message is not valid JSON for {expected}: {reason}")]
    Decode { expected: String, reason: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Message for stage {found} arrived on the {expected} queue")]
    WrongStage { expected: String, found: String }
}

impl MessageError {
    pub fn decode(expected: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::Decode {
            expected: expected.into(),
            reason: err.to_string()
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into()
        }
    }
}

/// Startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required setting: {key}")]
    Missing { key: String },

    #[error("Configuration validation failed: {reason}")]
    Validation { reason: String }
}

/// Outcome of a single stage handler invocation that did not succeed.
///
/// Both variants are handler-level: they are turned into a rejection and the
/// consumer loop moves on.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Malformed(#[from] MessageError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError)
}

impl HandlerError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Upstream(_) => "upstream"
        }
    }
}
