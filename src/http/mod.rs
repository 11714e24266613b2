//! HTTP protocol handling subsystem (the forwarding layer).
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, director rewrites target to the upstream)
//!     → hyper client → upstream
//!     → [rewrite::ResponseTransformer for textual bodies]
//!     → response.rs (error → status mapping)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{Upstream, UuidRequestId, X_REQUEST_ID};
pub use response::ProxyError;
pub use server::HttpServer;
