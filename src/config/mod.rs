//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config.toml
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks, all errors collected)
//!     → FaucetConfig (validated, immutable)
//!     → component settings derived via From<&NetworkConfig>
//!
//! environment
//!     → loader.rs Secrets (funding key, webhook token)
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Secrets never live in the file, only in the environment

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, Secrets};
pub use schema::{
    ChainKind, FaucetConfig, IpRateLimitConfig, NetworkConfig, NotifierConfig, ObservabilityConfig,
    ServerConfig,
};
