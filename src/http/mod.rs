//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, trace span, timeout, CORS, security headers)
//!     → security::rate_limit (per-IP window)
//!     → handlers.rs (/fund, /health)
//!     → SubmissionPipeline
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, FaucetServer};
