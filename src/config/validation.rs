//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate listener addresses parse as socket addresses
//! - Validate value ranges (backlog > 0, chunk size > 0, delays ordered)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AcceptorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AcceptorConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &AcceptorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (i, address) in config.listeners.addresses.iter().enumerate() {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                format!("listeners.addresses[{}]", i),
                format!("'{}' is not a socket address", address),
            ));
        }
    }

    let socket = &config.server.socket;
    if let Some(backlog) = socket.listen_backlog {
        if backlog <= 0 {
            errors.push(ValidationError::new(
                "server.socket.listen_backlog",
                "must be positive",
            ));
        }
    }
    if socket.keepalive_secs == Some(0) {
        errors.push(ValidationError::new(
            "server.socket.keepalive_secs",
            "must be positive when set",
        ));
    }

    let accept = &config.server.accept;
    if accept.rearm_base_delay_ms > accept.rearm_max_delay_ms {
        errors.push(ValidationError::new(
            "server.accept.rearm_base_delay_ms",
            "must not exceed rearm_max_delay_ms",
        ));
    }

    if config.server.endpoint.read_chunk_size == 0 {
        errors.push(ValidationError::new(
            "server.endpoint.read_chunk_size",
            "must be positive",
        ));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if !LOG_FORMATS.contains(&observability.log_format.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", observability.log_format),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
