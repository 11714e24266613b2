//! Response body rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! upstream Response<Bytes>
//!     → transformer.rs (text detection; skip everything else)
//!     → compression.rs (Content-Encoding → decompress)
//!     → charset.rs     (Content-Type charset → decode to String)
//!     → text.rs        (literal search/replace)
//!     → charset.rs     (re-encode only for registered legacy charsets)
//!     → compression.rs (re-compress with the original scheme)
//!     → transformer.rs (body swap + exact Content-Length)
//! ```
//!
//! # Design Decisions
//! - Whole bodies are buffered; there is no streaming variant
//! - Substitution runs on decoded text, never on encoded bytes
//! - Codecs live in registries keyed by token, so adding an encoding
//!   does not touch the orchestration
//! - A failing stage fails the whole response; nothing is half-rewritten

pub mod charset;
pub mod compression;
pub mod error;
pub mod text;
pub mod transformer;

pub use charset::{CharsetRegistry, TextCodec};
pub use compression::{BodyCodec, CompressionRegistry};
pub use error::{CharsetError, Stage, TransformError};
pub use text::{rewrite, RewriteRule};
pub use transformer::ResponseTransformer;
