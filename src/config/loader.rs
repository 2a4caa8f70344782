//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = parse_config("listener = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn semantic_errors_are_reported_together() {
        let err = parse_config(
            r#"
            [listener]
            bind_address = "not-an-address"
            [timeouts]
            connect_secs = 0
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn example_config_matches_builtin_rules() {
        let config = parse_config(include_str!("../../legacy-proxy.example.toml")).unwrap();
        let defaults = crate::config::default_rules();
        assert_eq!(config.rules.len(), defaults.len());
        for (loaded, builtin) in config.rules.iter().zip(&defaults) {
            assert_eq!(loaded.name, builtin.name);
            assert_eq!(loaded.hosts, builtin.hosts);
            assert_eq!(loaded.handler, builtin.handler);
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/legacy-proxy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
