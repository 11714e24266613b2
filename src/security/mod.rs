//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request  → headers.rs (strip hop-by-hop, optional X-Forwarded-For) → upstream
//! Upstream response → headers.rs (strip hop-by-hop) → client
//! ```
//!
//! # Design Decisions
//! - Connection-scoped headers never cross the proxy
//! - Client addresses are only disclosed upstream when configured

pub mod headers;
