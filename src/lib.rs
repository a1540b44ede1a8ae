//! Testnet faucet.
//!
//! Dispenses a fixed amount of test-network currency to requested addresses,
//! bounded per address by an hourly cap and a cooldown, with operator alerts
//! throttled per error kind.

// Core
pub mod chain;
pub mod clock;
pub mod errors;
pub mod faucet;
pub mod limiter;
pub mod notify;

// Surfaces
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::FaucetConfig;
pub use faucet::SubmissionPipeline;
pub use http::FaucetServer;
pub use lifecycle::Shutdown;
