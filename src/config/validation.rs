//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! constraints. Every problem is reported, not just the first one.

use std::net::SocketAddr;
use thiserror::Error;

use crate::chain::ss58;
use crate::config::schema::{ChainKind, FaucetConfig};
use crate::faucet::planck_amount;

/// How far the `finalized` tag of a proof-of-stake EVM chain trails the head:
/// two epochs of 32 twelve-second slots.
pub const EVM_FINALITY_LAG_SECS: u64 = 2 * 32 * 12;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &FaucetConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let network = &config.network;

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }

    if network.name.trim().is_empty() {
        errors.push(ValidationError::new("network.name", "must not be empty"));
    }

    if let Err(e) = network.endpoint.parse::<url::Url>() {
        errors.push(ValidationError::new(
            "network.endpoint",
            format!("'{}' is not a URL: {}", network.endpoint, e),
        ));
    }

    if network.fund_amount == 0 {
        errors.push(ValidationError::new("network.fund_amount", "must be positive"));
    } else if planck_amount(network.fund_amount, network.decimals).is_none() {
        errors.push(ValidationError::new(
            "network.fund_amount",
            format!(
                "{} with {} decimals overflows a 128-bit balance",
                network.fund_amount, network.decimals
            ),
        ));
    }

    if network.limit_per_hour == 0 {
        errors.push(ValidationError::new("network.limit_per_hour", "must be at least 1"));
    }

    if network.min_wait_time_minutes > 60 {
        errors.push(ValidationError::new(
            "network.min_wait_time_minutes",
            "must not exceed the 60 minute window",
        ));
    }

    if network.finalization_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "network.finalization_timeout_secs",
            "must be positive",
        ));
    }

    if network.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("network.connect_timeout_secs", "must be positive"));
    }

    if network.broadcast_timeout_secs <= network.connect_timeout_secs {
        errors.push(ValidationError::new(
            "network.broadcast_timeout_secs",
            "must exceed connect_timeout_secs",
        ));
    }

    if config.server.request_timeout_secs
        <= network.finalization_timeout_secs + network.broadcast_timeout_secs
    {
        errors.push(ValidationError::new(
            "server.request_timeout_secs",
            "must exceed finalization_timeout_secs + broadcast_timeout_secs",
        ));
    }

    match network.chain {
        ChainKind::Substrate => {
            if network.address_prefix > ss58::MAX_PREFIX {
                errors.push(ValidationError::new(
                    "network.address_prefix",
                    format!("must not exceed {}", ss58::MAX_PREFIX),
                ));
            }
        }
        ChainKind::Evm => match network.confirmations {
            Some(0) => {
                errors.push(ValidationError::new(
                    "network.confirmations",
                    "must be at least 1",
                ));
            }
            None if network.finalization_timeout_secs < EVM_FINALITY_LAG_SECS => {
                errors.push(ValidationError::new(
                    "network.finalization_timeout_secs",
                    format!(
                        "the finalized tag trails the head by about {} seconds; \
                         raise the timeout or set network.confirmations",
                        EVM_FINALITY_LAG_SECS
                    ),
                ));
            }
            _ => {}
        },
    }

    if config.ip_rate_limit.enabled
        && (config.ip_rate_limit.window_minutes == 0 || config.ip_rate_limit.max_requests == 0)
    {
        errors.push(ValidationError::new(
            "ip_rate_limit",
            "window_minutes and max_requests must be positive when enabled",
        ));
    }

    if let Some(url) = &config.notifier.webhook_url {
        if url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::new(
                "notifier.webhook_url",
                format!("'{}' is not a URL", url),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&FaucetConfig::default()), Ok(()));
    }

    #[test]
    fn test_reports_every_problem() {
        let mut config = FaucetConfig::default();
        config.network.endpoint = "not a url".into();
        config.network.limit_per_hour = 0;
        config.server.bind_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["server.bind_address", "network.endpoint", "network.limit_per_hour"]
        );
    }

    #[test]
    fn test_rejects_overflowing_amount() {
        let mut config = FaucetConfig::default();
        config.network.decimals = 40;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "network.fund_amount");
        assert!(errors[0].message.contains("overflows"));
    }

    #[test]
    fn test_evm_finality_fits_the_timeout() {
        let mut config = FaucetConfig::default();
        config.network.chain = ChainKind::Evm;
        config.network.endpoint = "https://rpc.sepolia.example".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "network.finalization_timeout_secs");

        config.network.confirmations = Some(0);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "network.confirmations");

        config.network.confirmations = Some(3);
        assert_eq!(validate_config(&config), Ok(()));

        config.network.confirmations = None;
        config.network.finalization_timeout_secs = 900;
        config.server.request_timeout_secs = 1_000;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_broadcast_timeout_covers_connect() {
        let mut config = FaucetConfig::default();
        config.network.broadcast_timeout_secs = config.network.connect_timeout_secs;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "network.broadcast_timeout_secs");
    }

    #[test]
    fn test_request_timeout_must_cover_finalization() {
        let mut config = FaucetConfig::default();
        config.server.request_timeout_secs = 60;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "server.request_timeout_secs");
    }
}
