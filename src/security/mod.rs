//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP fixed window, honoring trusted proxies)
//!     → handlers
//! Outgoing response:
//!     → headers.rs (nosniff, frame options, referrer policy)
//! ```
//!
//! # Design Decisions
//! - The per-IP limit is coarse abuse protection; per-address funding limits
//!   live in `crate::limiter`
//! - `X-Forwarded-For` is only trusted for the configured number of hops

pub mod headers;
pub mod rate_limit;
