//! # Configuration System
//!
//! Configuration for the HCP sync services.
//!
//! This crate provides:
//! - Configuration structures for every component
//! - TOML file loading
//! - Environment variable overlay (12-factor app principles)
//! - Role-aware validation
//!
//! Precedence, lowest to highest: defaults, TOML file, environment.

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod validator;

pub use config::{
    AccessControlConfig, BrokerConfig, Config, HrSourceConfig, IngestConfig, IngestMode,
    ObservabilityConfig, PersonDefaults, QueueConfig, RetryConfig, ServerConfig
};
pub use file_loader::load_from_toml;
pub use loader::{apply_env, load_from_env};
pub use validator::Role;

use errors::ConfigError;
use std::path::Path;

/// Load defaults, then the TOML file when given, then the environment.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            load_from_toml(path)?
        }
        None => Config::default()
    };
    apply_env(&mut config)?;
    Ok(config)
}
