//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),
    #[error("listener.max_connections must be greater than 0")]
    ZeroMaxConnections,
    #[error("listener.tls needs both cert_path and key_path")]
    IncompleteTls,
    #[error("timeouts.classify_ms must be greater than 0")]
    ZeroClassifyTimeout,
    #[error("protocol.delimiter must not be empty")]
    EmptyDelimiter,
    #[error("http.allow_origin must not be empty")]
    EmptyOriginPattern,
    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() || tls.key_path.trim().is_empty() {
            errors.push(ValidationError::IncompleteTls);
        }
    }
    if config.timeouts.classify_ms == 0 {
        errors.push(ValidationError::ZeroClassifyTimeout);
    }
    if config.protocol.delimiter.is_empty() {
        errors.push(ValidationError::EmptyDelimiter);
    }
    if let Some(pattern) = &config.http.allow_origin {
        if pattern.trim().is_empty() {
            errors.push(ValidationError::EmptyOriginPattern);
        }
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
