//! # Environment Variable Loader
//!
//! Overlays environment variables onto a [`Config`] following 12-factor app
//! principles. Unset variables leave the current value alone; set but
//! unparsable variables are an error rather than a silent fallback.
//!
//! # Naming Convention
//! - `BROKER_*`: Redis broker connection and consumer identity
//! - `QUEUE_*`: queue names
//! - `HR_*`: HR source
//! - `ACS_*`: access-control platform (`HIKVISION_*` accepted as aliases)
//! - `SERVER_*`: trigger HTTP server
//! - `INGEST_*`: ingestion mode
//! - `LOG_*`, `METRICS_*`: logging and metrics

use crate::config::{Config, IngestMode};
use errors::ConfigError;
use std::env;
use std::str::FromStr;

/// Build a configuration from defaults plus environment variables.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("Broker: {}", config.broker.display_addr());
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// ### Broker (`BROKER_*`)
/// - `BROKER_URL`: full `redis://` URL, overrides the fields below
/// - `BROKER_HOST`, `BROKER_PORT`, `BROKER_USERNAME`, `BROKER_PASSWORD`, `BROKER_DB`
/// - `BROKER_CONSUMER_GROUP`, `BROKER_CONSUMER_NAME` (default `$HOSTNAME`)
/// - `BROKER_POLL_INTERVAL_MS`, `BROKER_CLAIM_IDLE_MS`
///
/// ### Queues (`QUEUE_*`)
/// - `QUEUE_INGEST`, `QUEUE_CREATE_PERSON`, `QUEUE_UPDATE_IDENTIFIER`,
///   `QUEUE_ASSIGN_PRIVILEGE`, `QUEUE_DEAD_LETTER_SUFFIX`
///
/// ### HR source (`HR_*`)
/// - `HR_BASE_URL`, `HR_API_KEY`, `HR_APP_ID`, `HR_PAGE_LIMIT`,
///   `HR_INCLUDE_BASE64`, `HR_DATE_PARAM`, `HR_DEFAULT_DATE`,
///   `HR_TIMEOUT_SECONDS`, `HR_ACCEPT_INVALID_CERTS`
///
/// ### Access control (`ACS_*`)
/// - `ACS_BASE_URL` (alias `HIKVISION_BASE_URL`)
/// - `ACS_APP_KEY` (alias `HIKVISION_AK`)
/// - `ACS_APP_SECRET` (alias `HIKVISION_SECRET`)
/// - `ACS_TIMEOUT_SECONDS`, `ACS_ACCEPT_INVALID_CERTS`, `ACS_MAX_RETRIES`
///
/// ### Server, ingest, logging
/// - `SERVER_HOST`, `SERVER_PORT`
/// - `INGEST_MODE` (`legacy` | `staged`)
/// - `LOG_LEVEL`, `LOG_JSON`, `METRICS_ENABLED`, `METRICS_PORT`
pub fn load_from_env() -> Result<Config, ConfigError> {
    let mut config = Config::default();
    apply_env(&mut config)?;
    Ok(config)
}

/// Overlay environment variables onto an existing configuration.
pub fn apply_env(config: &mut Config) -> Result<(), ConfigError> {
    let broker = &mut config.broker;
    overlay_opt("BROKER_URL", &mut broker.url);
    overlay_string("BROKER_HOST", &mut broker.host);
    overlay_parsed("BROKER_PORT", &mut broker.port)?;
    overlay_opt("BROKER_USERNAME", &mut broker.username);
    overlay_opt("BROKER_PASSWORD", &mut broker.password);
    overlay_parsed("BROKER_DB", &mut broker.db)?;
    overlay_string("BROKER_CONSUMER_GROUP", &mut broker.consumer_group);
    overlay_string("BROKER_CONSUMER_NAME", &mut broker.consumer_name);
    overlay_parsed("BROKER_POLL_INTERVAL_MS", &mut broker.poll_interval_ms)?;
    overlay_parsed("BROKER_CLAIM_IDLE_MS", &mut broker.claim_idle_ms)?;

    let queues = &mut config.queues;
    overlay_string("QUEUE_INGEST", &mut queues.ingest);
    overlay_string("QUEUE_CREATE_PERSON", &mut queues.create_person);
    overlay_string("QUEUE_UPDATE_IDENTIFIER", &mut queues.update_identifier);
    overlay_string("QUEUE_ASSIGN_PRIVILEGE", &mut queues.assign_privilege);
    overlay_string("QUEUE_DEAD_LETTER_SUFFIX", &mut queues.dead_letter_suffix);

    let hr = &mut config.hr_source;
    overlay_string("HR_BASE_URL", &mut hr.base_url);
    overlay_string("HR_API_KEY", &mut hr.api_key);
    overlay_string("HR_APP_ID", &mut hr.app_id);
    overlay_parsed("HR_PAGE_LIMIT", &mut hr.page_limit)?;
    overlay_parsed("HR_INCLUDE_BASE64", &mut hr.include_base64)?;
    overlay_string("HR_DATE_PARAM", &mut hr.date_param);
    overlay_opt("HR_DEFAULT_DATE", &mut hr.default_date);
    overlay_parsed("HR_TIMEOUT_SECONDS", &mut hr.timeout_seconds)?;
    overlay_parsed("HR_ACCEPT_INVALID_CERTS", &mut hr.accept_invalid_certs)?;

    let acs = &mut config.access_control;
    overlay_string("HIKVISION_BASE_URL", &mut acs.base_url);
    overlay_string("HIKVISION_AK", &mut acs.app_key);
    overlay_string("HIKVISION_SECRET", &mut acs.app_secret);
    overlay_string("ACS_BASE_URL", &mut acs.base_url);
    overlay_string("ACS_APP_KEY", &mut acs.app_key);
    overlay_string("ACS_APP_SECRET", &mut acs.app_secret);
    overlay_parsed("ACS_TIMEOUT_SECONDS", &mut acs.timeout_seconds)?;
    overlay_parsed("ACS_ACCEPT_INVALID_CERTS", &mut acs.accept_invalid_certs)?;
    overlay_parsed("ACS_MAX_RETRIES", &mut acs.retry.max_retries)?;

    overlay_string("SERVER_HOST", &mut config.server.host);
    overlay_parsed("SERVER_PORT", &mut config.server.port)?;

    if let Some(raw) = read("INGEST_MODE") {
        config.ingest.mode = raw.parse::<IngestMode>().map_err(|reason| {
            ConfigError::InvalidValue {
                key: "INGEST_MODE".to_string(),
                reason
            }
        })?;
    }

    overlay_string("LOG_LEVEL", &mut config.observability.log_level);
    overlay_parsed("LOG_JSON", &mut config.observability.json_logs)?;
    overlay_parsed("METRICS_ENABLED", &mut config.observability.metrics_enabled)?;
    overlay_parsed("METRICS_PORT", &mut config.observability.metrics_port)?;

    Ok(())
}

fn read(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn overlay_string(key: &str, target: &mut String) {
    if let Some(value) = read(key) {
        *target = value;
    }
}

fn overlay_opt(key: &str, target: &mut Option<String>) {
    if let Some(value) = read(key) {
        *target = Some(value);
    }
}

fn overlay_parsed<T>(key: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display
{
    if let Some(value) = parse_env::<T>(key)? {
        *target = value;
    }
    Ok(())
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display
{
    match read(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string()
            }),
        None => Ok(None)
    }
}
