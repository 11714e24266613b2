//! Response body transformation.
//!
//! # Responsibilities
//! - Decide whether a response is textual
//! - Run decompress → decode → rewrite → encode → compress, in that order
//! - Replace the body and set an exact `Content-Length`
//!
//! # Design Decisions
//! - Non-textual responses are returned untouched, headers included
//! - So are textual responses in an unregistered `Content-Encoding`; their
//!   bytes are still compressed and must not be decoded as text
//! - Every outcome (rewritten, skipped, failed) is counted here
//! - The original `Content-Encoding` is kept; gzip in, gzip out
//! - Any stage failure consumes the response and returns the error, so a
//!   half-transformed response can never escape

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Response};

use crate::observability::metrics;
use crate::rewrite::charset::CharsetRegistry;
use crate::rewrite::compression::{BodyCodec, CompressionRegistry};
use crate::rewrite::error::TransformError;
use crate::rewrite::text::RewriteRule;

/// Media types containing this are treated as text.
const TEXT_INDICATOR: &str = "text";

/// Rewrites textual response bodies with one [`RewriteRule`].
#[derive(Debug)]
pub struct ResponseTransformer {
    rule: RewriteRule,
    charsets: CharsetRegistry,
    compression: CompressionRegistry,
}

impl ResponseTransformer {
    /// Transformer with the standard charset and compression registries.
    pub fn new(rule: RewriteRule) -> Self {
        Self::with_registries(rule, CharsetRegistry::standard(), CompressionRegistry::standard())
    }

    pub fn with_registries(
        rule: RewriteRule,
        charsets: CharsetRegistry,
        compression: CompressionRegistry,
    ) -> Self {
        Self {
            rule,
            charsets,
            compression,
        }
    }

    /// True when the declared media type is textual.
    pub fn is_textual(headers: &HeaderMap) -> bool {
        header_str(headers, header::CONTENT_TYPE)
            .map(|ct| ct.to_ascii_lowercase().contains(TEXT_INDICATOR))
            .unwrap_or(false)
    }

    /// True when the response is textual and its `Content-Encoding` is one
    /// the pipeline can undo.
    pub fn is_rewritable(&self, headers: &HeaderMap) -> bool {
        Self::is_textual(headers)
            && self
                .compression
                .recognizes(header_str(headers, header::CONTENT_ENCODING))
    }

    /// Hand back a response that will not be rewritten.
    pub fn pass_through<B>(&self, response: Response<B>) -> Response<B> {
        metrics::record_transform("skipped", 0);
        response
    }

    /// Rewrite a buffered response. Non-rewritable and empty responses come
    /// back as they went in.
    pub fn transform(&self, response: Response<Bytes>) -> Result<Response<Bytes>, TransformError> {
        if !self.is_rewritable(response.headers()) || response.body().is_empty() {
            return Ok(self.pass_through(response));
        }

        let (mut parts, body) = response.into_parts();
        let compression = self
            .compression
            .codec_for(header_str(&parts.headers, header::CONTENT_ENCODING));
        let rewritten = match self.rewrite_body(compression, &parts.headers, &body) {
            Ok(bytes) => bytes,
            Err(e) => {
                metrics::record_transform("failed", 0);
                return Err(e);
            }
        };

        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(rewritten.len()));

        Ok(Response::from_parts(parts, Bytes::from(rewritten)))
    }

    /// The byte-level pipeline for one body.
    fn rewrite_body(
        &self,
        compression: &dyn BodyCodec,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Vec<u8>, TransformError> {
        let content_type = header_str(headers, header::CONTENT_TYPE);

        let raw = compression
            .decompress(body)
            .map_err(TransformError::compression)?;

        let decoder = self.charsets.decoder_for(content_type, &raw);
        let text = decoder.decode(&raw).map_err(TransformError::charset)?;

        let rewritten = self.rule.apply(&text);

        let encoded = match self.charsets.encoder_for(content_type) {
            Some(encoder) => encoder
                .encode(&rewritten.text)
                .map_err(TransformError::charset)?,
            None => rewritten.text.as_bytes().to_vec(),
        };

        let out = compression
            .compress(&encoded)
            .map_err(TransformError::compression)?;

        tracing::debug!(
            charset = decoder.name(),
            content_encoding = compression.token(),
            replacements = rewritten.replacements,
            bytes_in = body.len(),
            bytes_out = out.len(),
            "Body rewritten"
        );
        metrics::record_transform("rewritten", rewritten.replacements);

        Ok(out)
    }
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
