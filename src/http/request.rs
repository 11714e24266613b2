//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Rewrite the request target to the configured upstream (the director)
//! - Prepare request for forwarding to the upstream
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Only scheme, authority, `Host` and the HTTP version change; path,
//!   query, other headers and the body are forwarded as received

use std::str::FromStr;

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderName, HeaderValue, Request, Uri, Version};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;
use uuid::Uuid;

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Produces a fresh UUID v4 for every request without an ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request's correlation ID, or `"unknown"`.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Why an upstream URL was rejected.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),

    #[error("scheme {0:?} is not supported, only plain http upstreams are")]
    UnsupportedScheme(String),

    #[error("no host given")]
    MissingHost,

    #[error("{0}")]
    InvalidAuthority(#[from] axum::http::uri::InvalidUri),
}

/// The upstream every request is directed to.
#[derive(Debug, Clone)]
pub struct Upstream {
    authority: Authority,
}

impl Upstream {
    /// Parse a base URL. A bare host is taken as `http://<host>`; any path
    /// is ignored.
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let raw = raw.trim();
        let url = if raw.contains("://") {
            Url::parse(raw)?
        } else {
            Url::parse(&format!("http://{raw}"))?
        };

        if url.scheme() != "http" {
            return Err(UpstreamError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url.host_str().ok_or(UpstreamError::MissingHost)?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            authority: Authority::from_str(&authority)?,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Point `request` at the upstream: scheme and authority of the URI,
    /// the `Host` header, and HTTP/1.1 for the upstream hop.
    pub fn direct<B>(&self, request: Request<B>) -> Result<Request<B>, axum::http::Error> {
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        parts.uri = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?;
        parts.version = Version::HTTP_11;
        parts
            .headers
            .insert(header::HOST, HeaderValue::from_str(self.authority.as_str())?);

        Ok(Request::from_parts(parts, body))
    }
}
