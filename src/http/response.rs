//! Response handling and error mapping.
//!
//! # Responsibilities
//! - Map forwarding and transform failures to HTTP status codes
//! - Keep failure details in the logs, not in client-facing bodies
//!
//! # Design Decisions
//! - Unreachable upstream and failed transforms are 502 Bad Gateway
//! - Upstream timeouts result in 504 Gateway Timeout
//! - A failed transform never yields a partial body

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::resilience::timeouts::Elapsed;
use crate::rewrite::TransformError;

/// Everything that can stop a request from being proxied.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("request target could not be rebuilt: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] hyper_util::client::legacy::Error),

    #[error("upstream timed out: {0}")]
    UpstreamTimeout(#[from] Elapsed),

    #[error("failed to read upstream body: {0}")]
    UpstreamBody(#[source] axum::Error),

    #[error("response transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("transform task failed: {0}")]
    Internal(#[from] tokio::task::JoinError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamBody(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Transform(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest(_) => "Invalid request target",
            ProxyError::UpstreamUnavailable(_) => "Upstream request failed",
            ProxyError::UpstreamTimeout(_) => "Upstream timed out",
            ProxyError::UpstreamBody(_) => "Upstream response could not be read",
            ProxyError::Transform(_) => "Upstream response could not be rewritten",
            ProxyError::Internal(_) => "Internal error",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.reason()).into_response()
    }
}
