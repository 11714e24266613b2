//! Errors raised while rewriting a response body.

use std::fmt;

/// Pipeline stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Character decoding or re-encoding.
    Charset,
    /// Decompression or re-compression.
    Compression,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Charset => "charset",
            Stage::Compression => "compression",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single charset codec.
#[derive(Debug, thiserror::Error)]
pub enum CharsetError {
    #[error("byte sequence is not valid {encoding}")]
    Malformed { encoding: &'static str },

    #[error("character {ch:?} cannot be represented in {encoding}")]
    Unmappable { encoding: &'static str, ch: char },
}

/// A transform aborted at `stage`. The response it was working on is gone;
/// callers answer with a gateway failure instead.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {cause}")]
pub struct TransformError {
    pub stage: Stage,
    #[source]
    pub cause: Box<dyn std::error::Error + Send + Sync>,
}

impl TransformError {
    pub fn charset(cause: CharsetError) -> Self {
        Self {
            stage: Stage::Charset,
            cause: Box::new(cause),
        }
    }

    pub fn compression(cause: std::io::Error) -> Self {
        Self {
            stage: Stage::Compression,
            cause: Box::new(cause),
        }
    }
}
