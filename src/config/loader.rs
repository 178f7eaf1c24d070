//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::overrides::Overrides;
use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    load_config_with(path, &Overrides::default())
}

/// Load a TOML file, apply command-line overrides, then validate the result.
pub fn load_config_with(path: &Path, overrides: &Overrides) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_with(&content, overrides)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    parse_config_with(content, &Overrides::default())
}

fn parse_config_with(content: &str, overrides: &Overrides) -> Result<ServerConfig, ConfigError> {
    let mut config: ServerConfig = toml::from_str(content)?;
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(parse_config("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn parses_sections() {
        let config = parse_config(
            r#"
            server_name = "edge-1"

            [listener]
            bind_address = "127.0.0.1:0"

            [cluster]
            routes = "127.0.0.1:6222"

            [pipe]
            name = "local"
            max_accept_queue = 16

            [lame_duck]
            duration_ms = 5000
            grace_period_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.server_name.as_deref(), Some("edge-1"));
        assert_eq!(config.listener.bind_address, "127.0.0.1:0");
        assert_eq!(config.listener.max_connections, 65_536);
        assert_eq!(config.cluster.routes.as_deref(), Some("127.0.0.1:6222"));
        assert_eq!(config.cluster.gateways, None);
        assert_eq!(config.pipe.name, "local");
        assert_eq!(config.pipe.max_accept_queue, 16);
        assert!(config.pipe.enabled);
        assert_eq!(config.lame_duck.grace_period_ms, 1000);
    }

    #[test]
    fn reports_validation_failures() {
        let err = parse_config("[accept]\nmin_sleep_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().starts_with("Validation failed: "));
    }

    #[test]
    fn reports_syntax_errors() {
        assert!(matches!(parse_config("[listener"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn overrides_are_validated_with_the_file() {
        let overrides = Overrides {
            listen: Some("not-an-address".into()),
            no_pipe: false,
        };
        let err = parse_config_with("", &overrides).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        // A file-only problem the flag replaces is not reported.
        let overrides = Overrides {
            listen: Some("127.0.0.1:0".into()),
            no_pipe: false,
        };
        let config = parse_config_with("[listener]\nbind_address = \"bogus\"\n", &overrides).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:0");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/broker.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
