//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that addresses and the rendering service URL parse
//! - Check that whitelist/blacklist entries compile as regular expressions
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use regex::Regex;
use crate::config::schema::{ProxyConfig, PrerenderConfig};

/// A single semantic problem found in a configuration.
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

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a whole proxy configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.origin.address.trim().is_empty() {
        errors.push(ValidationError::new("origin.address", "must not be empty"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    validate_prerender(&config.prerender, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_prerender(config: &PrerenderConfig, errors: &mut Vec<ValidationError>) {
    if let Err(e) = url::Url::parse(&config.service_url) {
        errors.push(ValidationError::new(
            "prerender.service_url",
            format!("'{}' is not a valid url: {}", config.service_url, e),
        ));
    }

    if let Some(protocol) = &config.protocol {
        if protocol != "http" && protocol != "https" {
            errors.push(ValidationError::new(
                "prerender.protocol",
                format!("'{}' must be http or https", protocol),
            ));
        }
    }

    for (list, patterns) in [("whitelist", &config.whitelist), ("blacklist", &config.blacklist)] {
        for (i, pattern) in patterns.iter().enumerate() {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ValidationError::new(
                    format!("prerender.{}[{}]", list, i),
                    e.to_string(),
                ));
            }
        }
    }

    if let Some(timeout) = config.upstream.timeout_secs {
        if timeout == 0 {
            errors.push(ValidationError::new(
                "prerender.upstream.timeout_secs",
                "must be greater than 0",
            ));
        }
    }

    for name in config.upstream.headers.keys() {
        if axum::http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "prerender.upstream.headers",
                format!("'{}' is not a valid header name", name),
            ));
        }
    }
}
