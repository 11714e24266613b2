//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, limits > 0)
//! - Check the upstream URL is something the forwarding layer can reach
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::http::request::Upstream;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.port must be between 1 and 65535")]
    InvalidPort,

    #[error("upstream.url {url:?} is invalid: {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("rewrite.search must not be empty")]
    EmptySearch,

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("limits.{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }

    if let Err(e) = Upstream::parse(&config.upstream.url) {
        errors.push(ValidationError::InvalidUpstream {
            url: config.upstream.url.clone(),
            reason: e.to_string(),
        });
    }

    if config.rewrite.search.is_empty() {
        errors.push(ValidationError::EmptySearch);
    }

    let timeouts = [
        ("connect_secs", config.timeouts.connect_secs),
        ("upstream_secs", config.timeouts.upstream_secs),
        ("request_secs", config.timeouts.request_secs),
    ];
    for (name, secs) in timeouts {
        if secs == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    let limits = [
        ("max_request_body_bytes", config.limits.max_request_body_bytes),
        ("max_response_body_bytes", config.limits.max_response_body_bytes),
    ];
    for (name, bytes) in limits {
        if bytes == 0 {
            errors.push(ValidationError::ZeroLimit(name));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
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
