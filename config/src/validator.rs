//! # Configuration Validation
//!
//! Structural checks come from the `validator` derive on the config
//! structures. On top of those, each process role requires a different set
//! of credentials and endpoints; [`Config::validate_for`] checks exactly the
//! ones the role being started will use.

use crate::config::Config;
use errors::ConfigError;
use validator::Validate;

/// What the process is about to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Trigger HTTP server: HR source plus broker.
    Serve,
    /// Three-stage pipeline workers: access-control platform plus broker.
    Worker,
    /// Single-stage worker on the ingestion queue.
    LegacyWorker,
    /// One-off ingestion run: HR source plus broker.
    Ingest,
    /// Broker connectivity only.
    Check
}

impl Role {
    fn needs_hr_source(self) -> bool {
        matches!(self, Role::Serve | Role::Ingest)
    }

    fn needs_access_control(self) -> bool {
        matches!(self, Role::Worker | Role::LegacyWorker)
    }
}

impl Config {
    /// Run structural validation, then the credential checks for `role`.
    pub fn validate_for(&self, role: Role) -> Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::Validation {
            reason: e.to_string()
        })?;

        if self.broker.consumer_group.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                key: "broker.consumer_group".to_string(),
                reason: "must not contain whitespace".to_string()
            });
        }

        if role.needs_hr_source() {
            require("hr_source.base_url", &self.hr_source.base_url)?;
            require("hr_source.api_key", &self.hr_source.api_key)?;
            require_http_url("hr_source.base_url", &self.hr_source.base_url)?;
        }

        if role.needs_access_control() {
            require("access_control.base_url", &self.access_control.base_url)?;
            require("access_control.app_key", &self.access_control.app_key)?;
            require("access_control.app_secret", &self.access_control.app_secret)?;
            require_http_url("access_control.base_url", &self.access_control.base_url)?;
        }

        if role == Role::Worker && self.zones.is_empty() {
            tracing::warn!("zone mapping is empty; no privilege groups will ever be assigned");
        }

        Ok(())
    }
}

fn require(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing {
            key: key.to_string()
        });
    }
    Ok(())
}

fn require_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{value}' is not an http(s) URL")
        })
    }
}
