//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

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

/// Parse and validate a TOML document.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.timeouts.classify_ms, 1000);
        assert_eq!(config.timeouts.read_secs, 120);
        assert!(config.protocol.raw_fallback);
        assert_eq!(config.protocol.delimiter, "\n");
        assert_eq!(config.protocol.message_limit, 0);
        assert!(!config.http.explicit_end);
        assert!(config.http.allow_origin.is_none());
        assert!(config.listener.tls.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [protocol]
            raw_fallback = false
            delimiter = "\r\n"
            message_limit = 64

            [http]
            explicit_end = true
            allow_origin = "*.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert!(!config.protocol.raw_fallback);
        assert_eq!(config.protocol.delimiter, "\r\n");
        assert_eq!(config.protocol.message_limit, 64);
        assert!(config.http.explicit_end);
        assert_eq!(config.http.allow_origin.as_deref(), Some("*.example.com"));
    }

    #[test]
    fn invalid_values_are_all_reported() {
        let err = parse_config(
            r#"
            [protocol]
            delimiter = ""

            [timeouts]
            classify_ms = 0
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            parse_config("[listener"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/portmux.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
