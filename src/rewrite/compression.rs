//! Content-Encoding adapters.
//!
//! # Responsibilities
//! - Map a `Content-Encoding` token to a codec
//! - Decompress a whole body through a `Read` adapter
//! - Re-compress through a `Write` sink that must be finished
//!
//! # Design Decisions
//! - Unknown or absent tokens are identity, bytes are copied as-is
//! - Callers that must not touch opaque data ask [`CompressionRegistry::recognizes`]
//!   first; an unregistered token means the bytes are still compressed
//! - Tokens match case-insensitively after trimming
//! - `finish` consumes the compressor, so a body can't be read back
//!   before the gzip trailer is written

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};

use flate2::read::{MultiGzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

/// A compressing sink. Output is only complete after [`Compressor::finish`].
pub trait Compressor: Write + Send {
    fn finish(self: Box<Self>) -> io::Result<Vec<u8>>;
}

/// One `Content-Encoding` scheme.
pub trait BodyCodec: Send + Sync + fmt::Debug {
    /// Token as it appears in `Content-Encoding`.
    fn token(&self) -> &'static str;

    /// Other tokens that mean the same scheme.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn decompressor<'a>(&self, input: &'a [u8]) -> Box<dyn Read + 'a>;

    fn compressor(&self) -> Box<dyn Compressor>;

    fn decompress(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len());
        self.decompressor(input).read_to_end(&mut out)?;
        Ok(out)
    }

    fn compress(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut writer = self.compressor();
        writer.write_all(input)?;
        writer.flush()?;
        writer.finish()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

#[derive(Debug, Default)]
struct PassThrough(Vec<u8>);

impl Write for PassThrough {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Compressor for PassThrough {
    fn finish(self: Box<Self>) -> io::Result<Vec<u8>> {
        Ok(self.0)
    }
}

impl BodyCodec for Identity {
    fn token(&self) -> &'static str {
        "identity"
    }

    fn decompressor<'a>(&self, input: &'a [u8]) -> Box<dyn Read + 'a> {
        Box::new(input)
    }

    fn compressor(&self) -> Box<dyn Compressor> {
        Box::new(PassThrough::default())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Gzip;

impl Compressor for GzEncoder<Vec<u8>> {
    fn finish(self: Box<Self>) -> io::Result<Vec<u8>> {
        GzEncoder::finish(*self)
    }
}

impl BodyCodec for Gzip {
    fn token(&self) -> &'static str {
        "gzip"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["x-gzip"]
    }

    // Concatenated members are legal gzip and must all be read.
    fn decompressor<'a>(&self, input: &'a [u8]) -> Box<dyn Read + 'a> {
        Box::new(MultiGzDecoder::new(input))
    }

    fn compressor(&self) -> Box<dyn Compressor> {
        Box::new(GzEncoder::new(Vec::new(), Compression::default()))
    }
}

/// HTTP `deflate`, which is zlib-wrapped.
#[derive(Debug, Default, Clone, Copy)]
pub struct Deflate;

impl Compressor for ZlibEncoder<Vec<u8>> {
    fn finish(self: Box<Self>) -> io::Result<Vec<u8>> {
        ZlibEncoder::finish(*self)
    }
}

impl BodyCodec for Deflate {
    fn token(&self) -> &'static str {
        "deflate"
    }

    fn decompressor<'a>(&self, input: &'a [u8]) -> Box<dyn Read + 'a> {
        Box::new(ZlibDecoder::new(input))
    }

    fn compressor(&self) -> Box<dyn Compressor> {
        Box::new(ZlibEncoder::new(Vec::new(), Compression::default()))
    }
}

/// Registry of supported `Content-Encoding` schemes.
#[derive(Debug)]
pub struct CompressionRegistry {
    codecs: HashMap<&'static str, Box<dyn BodyCodec>>,
    identity: Identity,
}

impl CompressionRegistry {
    /// Empty registry; every token resolves to identity.
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
            identity: Identity,
        }
    }

    /// identity, gzip and deflate.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Identity);
        registry.register(Gzip);
        registry.register(Deflate);
        registry
    }

    pub fn register<C>(&mut self, codec: C)
    where
        C: BodyCodec + Clone + 'static,
    {
        for &alias in codec.aliases() {
            self.codecs.insert(alias, Box::new(codec.clone()));
        }
        self.codecs.insert(codec.token(), Box::new(codec));
    }

    /// True when the body behind `content_encoding` can be decompressed:
    /// the header is absent or empty, or names a registered scheme.
    pub fn recognizes(&self, content_encoding: Option<&str>) -> bool {
        match normalize(content_encoding) {
            Some(token) => self.codecs.contains_key(token.as_str()),
            None => true,
        }
    }

    /// Codec for a `Content-Encoding` value. Falls back to identity.
    pub fn codec_for(&self, content_encoding: Option<&str>) -> &dyn BodyCodec {
        let Some(token) = normalize(content_encoding) else {
            return &self.identity;
        };

        match self.codecs.get(token.as_str()) {
            Some(codec) => codec.as_ref(),
            None => {
                tracing::debug!(content_encoding = %token, "Unsupported content encoding, passing bytes through");
                &self.identity
            }
        }
    }
}

impl Default for CompressionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn normalize(content_encoding: Option<&str>) -> Option<String> {
    content_encoding
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_lowercase)
}
