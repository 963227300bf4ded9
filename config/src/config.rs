//! # Configuration Structures
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization, every section defaults
//! - Use `validator` for structural validation
//! - Never carry hardcoded secrets; credentials default to empty and are
//!   checked per role in [`crate::validator`]

use hcp_core::{Stage, ZoneMapping};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Main configuration structure for the sync service.
///
/// ## Sections
/// - `broker`: Redis Streams broker connection and consumer identity
/// - `queues`: queue (stream) names per stage
/// - `hr_source`: paginated HR listing endpoint and credentials
/// - `access_control`: access-control platform endpoint, signing keys, retry
/// - `person`: constant fields sent when creating a person
/// - `zones`: regional slug to privilege group table
/// - `server`: inbound trigger HTTP server
/// - `ingest`: how fetched pages are fanned out
/// - `observability`: logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub broker: BrokerConfig,

    #[validate(nested)]
    pub queues: QueueConfig,

    #[validate(nested)]
    pub hr_source: HrSourceConfig,

    #[validate(nested)]
    pub access_control: AccessControlConfig,

    #[validate(nested)]
    pub person: PersonDefaults,

    pub zones: ZoneMapping,

    #[validate(nested)]
    pub server: ServerConfig,

    pub ingest: IngestConfig,

    #[validate(custom(function = "validate_observability"))]
    pub observability: ObservabilityConfig
}

/// Redis Streams broker settings.
///
/// `url`, when set, wins over the individual host/port/credential fields.
#[derive(Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub url: Option<String>,

    #[validate(length(min = 1, max = 255))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16,

    pub username: Option<String>,

    #[serde(skip_serializing)]
    pub password: Option<String>,

    pub db: u8,

    /// Consumer group shared by every worker reading a stage queue.
    #[validate(length(min = 1, max = 128))]
    pub consumer_group: String,

    /// Consumer name prefix, unique per replica. Defaults to `$HOSTNAME`.
    /// Keep it stable across restarts so that unacknowledged deliveries
    /// come back to the restarted worker.
    #[validate(length(min = 1, max = 128))]
    pub consumer_name: String,

    /// Sleep between polls of an empty queue.
    #[validate(range(min = 10, max = 60000))]
    pub poll_interval_ms: u64,

    /// An idle consumer claims entries another consumer left pending for at
    /// least this long (a crashed or renamed replica).
    #[validate(range(min = 1000))]
    pub claim_idle_ms: u64
}

fn default_consumer_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "worker-1".to_string())
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            db: 0,
            consumer_group: "hcp-sync".to_string(),
            consumer_name: default_consumer_name(),
            poll_interval_ms: 500,
            claim_idle_ms: 60_000
        }
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .field("consumer_group", &self.consumer_group)
            .field("consumer_name", &self.consumer_name)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("claim_idle_ms", &self.claim_idle_ms)
            .finish()
    }
}

impl BrokerConfig {
    /// Connection URL for the Redis client.
    pub fn connection_url(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }

        let auth = match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => format!(
                "{}:{}@",
                urlencoding::encode(user),
                urlencoding::encode(pass)
            ),
            (None, Some(pass)) => format!(":{}@", urlencoding::encode(pass)),
            (Some(user), None) => format!("{}@", urlencoding::encode(user)),
            (None, None) => String::new()
        };

        format!("redis://{}{}:{}/{}", auth, self.host, self.port, self.db)
    }

    /// Host and port only, safe to log.
    pub fn display_addr(&self) -> String {
        match self.url.as_deref().filter(|u| !u.is_empty()) {
            Some(_) => "<configured url>".to_string(),
            None => format!("{}:{}", self.host, self.port)
        }
    }
}

/// Queue (stream) names.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Page-per-message ingestion queue consumed by the legacy worker.
    #[validate(length(min = 1, max = 255))]
    pub ingest: String,

    #[validate(length(min = 1, max = 255))]
    pub create_person: String,

    #[validate(length(min = 1, max = 255))]
    pub update_identifier: String,

    #[validate(length(min = 1, max = 255))]
    pub assign_privilege: String,

    /// Appended to a queue name to form its dead-letter queue.
    #[validate(length(min = 1, max = 64))]
    pub dead_letter_suffix: String,

    /// Queue declared by the connectivity probe.
    #[validate(length(min = 1, max = 255))]
    pub probe: String
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ingest: "hikvision_queue".to_string(),
            create_person: "create_person_queue".to_string(),
            update_identifier: "update_kib_queue".to_string(),
            assign_privilege: "assign_privilege_queue".to_string(),
            dead_letter_suffix: ":dlq".to_string(),
            probe: "connection_test".to_string()
        }
    }
}

impl QueueConfig {
    pub fn for_stage(&self, stage: Stage) -> &str {
        match stage {
            Stage::CreatePerson => &self.create_person,
            Stage::UpdateIdentifier => &self.update_identifier,
            Stage::AssignPrivilege => &self.assign_privilege
        }
    }

    pub fn dead_letter(&self, queue: &str) -> String {
        format!("{}{}", queue, self.dead_letter_suffix)
    }
}

/// HR source (paginated employee listing).
#[derive(Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct HrSourceConfig {
    pub base_url: String,

    #[serde(skip_serializing)]
    pub api_key: String,

    #[validate(length(min = 1, max = 128))]
    pub app_id: String,

    #[validate(range(min = 1, max = 1000))]
    pub page_limit: u32,

    pub include_base64: bool,

    /// Name of the query parameter carrying the filter date.
    #[validate(length(min = 1, max = 64))]
    pub date_param: String,

    /// Date used when a sync request does not name one. Today (UTC) when unset.
    pub default_date: Option<String>,

    #[validate(range(min = 1, max = 600))]
    pub timeout_seconds: u64,

    pub accept_invalid_certs: bool
}

impl Default for HrSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gcp-api.eposh.id/v1/induction/employees".to_string(),
            api_key: String::new(),
            app_id: "hcpvision".to_string(),
            page_limit: 10,
            include_base64: false,
            date_param: "induction_date".to_string(),
            default_date: None,
            timeout_seconds: 30,
            accept_invalid_certs: false
        }
    }
}

impl std::fmt::Debug for HrSourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HrSourceConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("app_id", &self.app_id)
            .field("page_limit", &self.page_limit)
            .field("include_base64", &self.include_base64)
            .field("date_param", &self.date_param)
            .field("default_date", &self.default_date)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Retry policy for transient access-control failures.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    #[validate(range(max = 10))]
    pub max_retries: u32,
    #[validate(range(min = 1))]
    pub initial_backoff_ms: u64,
    #[validate(range(min = 1))]
    pub max_backoff_ms: u64
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000
        }
    }
}

/// Access-control platform (signed HTTP API).
#[derive(Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct AccessControlConfig {
    pub base_url: String,

    /// Sent as `X-Ca-Key`.
    pub app_key: String,

    /// HMAC key for `X-Ca-Signature`.
    #[serde(skip_serializing)]
    pub app_secret: String,

    #[validate(length(min = 1))]
    pub create_person_path: String,

    #[validate(length(min = 1))]
    pub update_person_path: String,

    #[validate(length(min = 1))]
    pub assign_privilege_path: String,

    #[validate(range(min = 1, max = 600))]
    pub timeout_seconds: u64,

    #[validate(range(min = 1, max = 120))]
    pub photo_timeout_seconds: u64,

    pub accept_invalid_certs: bool,

    #[validate(nested)]
    pub retry: RetryConfig
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            app_key: String::new(),
            app_secret: String::new(),
            create_person_path: "/artemis/api/resource/v1/person/single/add".to_string(),
            update_person_path: "/artemis/api/resource/v1/person/single/update".to_string(),
            assign_privilege_path: "/artemis/api/acs/v1/privilege/group/single/addPersons"
                .to_string(),
            timeout_seconds: 30,
            photo_timeout_seconds: 10,
            accept_invalid_certs: false,
            retry: RetryConfig::default()
        }
    }
}

impl std::fmt::Debug for AccessControlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControlConfig")
            .field("base_url", &self.base_url)
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("create_person_path", &self.create_person_path)
            .field("update_person_path", &self.update_person_path)
            .field("assign_privilege_path", &self.assign_privilege_path)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("photo_timeout_seconds", &self.photo_timeout_seconds)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Constant fields of the person-create request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct PersonDefaults {
    pub family_name: String,

    #[validate(range(min = 0, max = 2))]
    pub gender: u8,

    #[validate(length(min = 1))]
    pub org_index_code: String,

    pub remark: String,

    /// Used when the HR record has no phone number.
    pub default_phone: String,

    /// Used when the HR record has no email address.
    pub default_email: String,

    #[validate(length(min = 1))]
    pub begin_time: String,

    #[validate(length(min = 1))]
    pub end_time: String
}

impl Default for PersonDefaults {
    fn default() -> Self {
        Self {
            family_name: " ".to_string(),
            gender: 1,
            org_index_code: "1".to_string(),
            remark: "From Eposh Induction".to_string(),
            default_phone: "0000000000".to_string(),
            default_email: "xxx@gmail.com".to_string(),
            begin_time: "2026-01-05T00:00:00+08:00".to_string(),
            end_time: "2030-12-31T23:59:59+08:00".to_string()
        }
    }
}

/// Inbound trigger HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000
        }
    }
}

/// Where fetched HR pages go.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// One `{event, data: page}` message per page on the ingestion queue.
    #[default]
    Legacy,
    /// One Create-Person stage message per employee.
    Staged
}

impl std::str::FromStr for IngestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(IngestMode::Legacy),
            "staged" => Ok(IngestMode::Staged),
            other => Err(format!("unknown ingest mode '{other}' (expected legacy|staged)"))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    pub mode: IngestMode
}

/// Logging and metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_level: String,
    pub json_logs: bool,
    pub metrics_enabled: bool,
    /// Port of the `/metrics` listener run by worker processes. `serve`
    /// renders metrics on its own router instead.
    pub metrics_port: u16
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_port: 9090
        }
    }
}

fn validate_observability(value: &ObservabilityConfig) -> Result<(), validator::ValidationError> {
    match value.log_level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid logging level"))
    }
}
