//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → connect timeout (hyper connector)
//!     → timeouts.rs (deadline for response headers)
//!     → On expiry: 504 to the client
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - No retries: the proxy is a pass-through, retry policy belongs to clients

pub mod timeouts;
