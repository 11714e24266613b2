//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::Deserialize;

/// Root configuration for the rewriting proxy.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind host, port).
    pub listener: ListenerConfig,

    /// The single upstream every request is forwarded to.
    pub upstream: UpstreamConfig,

    /// Search/replace pair applied to textual bodies.
    pub rewrite: RewriteConfig,

    /// Body size limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// Plain HTTP port.
    pub port: u16,
}

impl ListenerConfig {
    /// `host:port`, suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL (scheme + host). A bare host means `http://<host>`.
    pub url: String,

    /// Append the client address to `X-Forwarded-For`.
    pub forwarded_for: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://www.baikal.travel".to_string(),
            forwarded_for: false,
        }
    }
}

/// Literal substitution applied to textual responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Literal to look for. Must not be empty.
    pub search: String,

    /// Literal to put in its place. May be empty.
    pub replace: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            search: "Байкал".to_string(),
            replace: "Baikal".to_string(),
        }
    }
}

/// Body size limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound request body forwarded upstream.
    pub max_request_body_bytes: usize,

    /// Maximum textual response body buffered for rewriting.
    pub max_response_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_body_bytes: 2 * 1024 * 1024,   // 2MB
            max_response_body_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time to wait for upstream response headers in seconds.
    pub upstream_secs: u64,

    /// Total time for one request/response in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            request_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
