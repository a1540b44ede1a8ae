//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::FaucetConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable holding the funding account's secret: a mnemonic or
/// secret URI on Substrate networks, a hex private key on EVM networks.
pub const ACCOUNT_SECRET_VAR: &str = "FAUCET_ACCOUNT_SECRET";

/// Environment variable holding the Slack webhook token.
pub const SLACK_TOKEN_VAR: &str = "SLACK_WEB_HOOK_TOKEN";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("missing environment variable {0}")]
    MissingSecret(&'static str),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<FaucetConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<FaucetConfig, ConfigError> {
    let config: FaucetConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Secrets read once from the environment at startup.
#[derive(Clone)]
pub struct Secrets {
    pub account_secret: String,
    pub slack_token: Option<String>,
}

impl Secrets {
    /// Read secrets from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read secrets through an arbitrary lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let account_secret = lookup(ACCOUNT_SECRET_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingSecret(ACCOUNT_SECRET_VAR))?;

        Ok(Self {
            account_secret,
            slack_token: lookup(SLACK_TOKEN_VAR).filter(|v| !v.trim().is_empty()),
        })
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("account_secret", &"<redacted>")
            .field("slack_token", &self.slack_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
