//! # Configuration File Loading
//!
//! Loads configuration from a TOML file. Every section is optional; missing
//! keys keep their defaults.

use crate::config::Config;
use errors::ConfigError;
use std::path::Path;

/// Load configuration from a TOML file.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_toml;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_toml(Path::new("hcp-sync.toml"))?;
///     println!("Create-person queue: {}", config.queues.create_person);
///     Ok(())
/// }
/// ```
pub fn load_from_toml(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string()
    })?;

    parse_toml(&contents).map_err(|reason| ConfigError::Parse {
        path: path.display().to_string(),
        reason
    })
}

pub(crate) fn parse_toml(contents: &str) -> Result<Config, String> {
    toml::from_str(contents).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_partial_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[broker]
host = "redis.internal"
consumer_name = "worker-7"

[queues]
create_person = "cp_queue"

[ingest]
mode = "staged"

[zones]
"zona-i" = "11"
"north" = "42"
"#
        )
        .unwrap();

        let config = load_from_toml(file.path()).unwrap();
        assert_eq!(config.broker.host, "redis.internal");
        assert_eq!(config.broker.port, 6379);
        assert_eq!(config.broker.consumer_name, "worker-7");
        assert_eq!(config.queues.create_person, "cp_queue");
        assert_eq!(config.queues.update_identifier, "update_kib_queue");
        assert_eq!(config.ingest.mode, IngestMode::Staged);
        assert_eq!(config.zones.get("north"), Some("42"));
        assert_eq!(config.zones.get("tuks"), None);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_file_not_found() {
        let result = load_from_toml(Path::new("/nonexistent/hcp-sync.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[broker\nhost = ").unwrap();

        let result = load_from_toml(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        assert!(parse_toml("[broker]\nport = \"six\"").is_err());
    }
}
