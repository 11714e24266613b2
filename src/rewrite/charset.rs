//! Charset resolution for textual bodies.
//!
//! # Responsibilities
//! - Pick the decoder for a body from its `Content-Type` (or the body itself)
//! - Pick the encoder that restores the original byte encoding
//! - Keep codecs in a registry keyed by canonical encoding name
//!
//! # Design Decisions
//! - Labels are normalised through `encoding_rs`, so aliases such as
//!   `cp1251` resolve to the same codec as `windows-1251`
//! - Unknown or missing charsets decode as lossy UTF-8 and are never
//!   re-encoded; the rewritten body goes out as UTF-8
//! - Only the charset declared in the header drives re-encoding, sniffed
//!   charsets never do

use std::collections::HashMap;
use std::fmt;

use encoding_rs::{EncoderResult, Encoding, KOI8_R, UTF_8, WINDOWS_1251};

use crate::rewrite::error::CharsetError;

/// Bytes inspected when looking for a `<meta>` charset declaration.
const PRESCAN_LIMIT: usize = 1024;

/// Converts between one byte encoding and canonical text.
pub trait TextCodec: Send + Sync + fmt::Debug {
    /// Canonical encoding name (as `encoding_rs` spells it).
    fn name(&self) -> &'static str;

    fn decode(&self, bytes: &[u8]) -> Result<String, CharsetError>;

    fn encode(&self, text: &str) -> Result<Vec<u8>, CharsetError>;

    /// True when decoded text can go out as-is (UTF-8 bytes).
    fn is_passthrough(&self) -> bool {
        false
    }
}

/// UTF-8 identity codec. Invalid sequences are replaced, not rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Codec;

impl TextCodec for Utf8Codec {
    fn name(&self) -> &'static str {
        UTF_8.name()
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, CharsetError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>, CharsetError> {
        Ok(text.as_bytes().to_vec())
    }

    fn is_passthrough(&self) -> bool {
        true
    }
}

/// Strict codec for a single-byte legacy encoding such as Windows-1251.
#[derive(Debug, Clone, Copy)]
pub struct SingleByteCodec {
    encoding: &'static Encoding,
}

impl SingleByteCodec {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self { encoding }
    }
}

impl TextCodec for SingleByteCodec {
    fn name(&self) -> &'static str {
        self.encoding.name()
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, CharsetError> {
        self.encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .ok_or(CharsetError::Malformed {
                encoding: self.encoding.name(),
            })
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>, CharsetError> {
        let mut encoder = self.encoding.new_encoder();
        let mut out = Vec::with_capacity(text.len());
        let mut consumed = 0;

        loop {
            let (result, read) =
                encoder.encode_from_utf8_to_vec_without_replacement(&text[consumed..], &mut out, true);
            consumed += read;

            match result {
                EncoderResult::InputEmpty => return Ok(out),
                EncoderResult::OutputFull => out.reserve(text.len() - consumed + 16),
                EncoderResult::Unmappable(ch) => {
                    return Err(CharsetError::Unmappable {
                        encoding: self.encoding.name(),
                        ch,
                    })
                }
            }
        }
    }
}

/// Registry of the charsets the proxy can decode and restore.
#[derive(Debug)]
pub struct CharsetRegistry {
    codecs: HashMap<&'static str, Box<dyn TextCodec>>,
    fallback: Utf8Codec,
}

impl CharsetRegistry {
    /// Empty registry; everything decodes through the UTF-8 fallback.
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
            fallback: Utf8Codec,
        }
    }

    /// UTF-8, Windows-1251 and KOI8-R.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Utf8Codec);
        registry.register(SingleByteCodec::new(WINDOWS_1251));
        registry.register(SingleByteCodec::new(KOI8_R));
        registry
    }

    pub fn register(&mut self, codec: impl TextCodec + 'static) {
        self.codecs.insert(codec.name(), Box::new(codec));
    }

    /// Look up a codec by any label `encoding_rs` knows for it.
    pub fn lookup(&self, label: &str) -> Option<&dyn TextCodec> {
        let encoding = Encoding::for_label(label.trim().as_bytes())?;
        self.codecs.get(encoding.name()).map(|codec| codec.as_ref())
    }

    /// Decoder for a body. The declared charset wins; without one the body
    /// is sniffed for a byte-order mark and then a `<meta>` declaration.
    pub fn decoder_for(&self, content_type: Option<&str>, body: &[u8]) -> &dyn TextCodec {
        let label = content_type.and_then(declared_charset);

        let codec = match label {
            Some(label) => self.lookup(label),
            None => sniff(body).and_then(|encoding| self.codecs.get(encoding.name()).map(|c| c.as_ref())),
        };

        match codec {
            Some(codec) => codec,
            None => {
                if let Some(label) = label {
                    tracing::debug!(charset = %label, "Unsupported charset, decoding as UTF-8");
                }
                &self.fallback
            }
        }
    }

    /// Encoder that restores the declared charset, when it is one the
    /// registry can produce. `None` means the text is emitted as UTF-8.
    pub fn encoder_for(&self, content_type: Option<&str>) -> Option<&dyn TextCodec> {
        let label = content_type.and_then(declared_charset)?;
        self.lookup(label).filter(|codec| !codec.is_passthrough())
    }
}

impl Default for CharsetRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// The `charset` parameter of a `Content-Type` value, unquoted.
pub fn declared_charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        (!value.is_empty()).then_some(value)
    })
}

/// Guess the encoding of an undeclared body.
fn sniff(body: &[u8]) -> Option<&'static Encoding> {
    if let Some((encoding, _)) = Encoding::for_bom(body) {
        return Some(encoding);
    }
    prescan_meta(&body[..body.len().min(PRESCAN_LIMIT)])
}

/// Find `charset=` inside a `<meta ...>` tag. Covers both
/// `<meta charset="...">` and the `http-equiv` content form.
fn prescan_meta(head: &[u8]) -> Option<&'static Encoding> {
    let head = head.to_ascii_lowercase();
    let mut rest = head.as_slice();

    while let Some(start) = find(rest, b"<meta") {
        let tag = &rest[start..];
        let end = tag.iter().position(|&b| b == b'>').unwrap_or(tag.len());
        let attrs = &tag[..end];

        if let Some(label) = find(attrs, b"charset").and_then(|at| charset_value(&attrs[at + 7..])) {
            if let Some(encoding) = Encoding::for_label(label) {
                return Some(encoding);
            }
        }
        rest = &tag[end..];
    }
    None
}

fn charset_value(after_name: &[u8]) -> Option<&[u8]> {
    let rest = after_name.trim_ascii_start().strip_prefix(b"=")?;
    let rest = rest.trim_ascii_start();
    let rest = rest
        .strip_prefix(b"\"")
        .or_else(|| rest.strip_prefix(b"'"))
        .unwrap_or(rest);
    let len = rest
        .iter()
        .position(|&b| matches!(b, b'"' | b'\'' | b';' | b'/' | b'>') || b.is_ascii_whitespace())
        .unwrap_or(rest.len());
    (len > 0).then(|| &rest[..len])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
