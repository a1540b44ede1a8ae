//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the faucet.
//! All types derive Serde traits for deserialization from the TOML file, and
//! every section has defaults so a minimal file only names the network.

use serde::{Deserialize, Serialize};

/// Root configuration for the faucet service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FaucetConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,

    /// Target network and funding policy.
    pub network: NetworkConfig,

    /// Coarse per-IP limit applied in front of the per-address limiter.
    pub ip_rate_limit: IpRateLimitConfig,

    /// Operator alert delivery.
    pub notifier: NotifierConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Whole-request timeout in seconds. Must exceed the finalization timeout.
    pub request_timeout_secs: u64,

    /// Allow cross-origin requests from any origin.
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 180,
            cors_enabled: true,
        }
    }
}

/// Which chain adapter serves the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    /// Substrate node over WebSocket RPC; sr25519 key, ss58 addresses.
    #[default]
    Substrate,
    /// EVM JSON-RPC node; secp256k1 key, hex addresses.
    Evm,
}

/// The single network this faucet serves.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Human-readable network name used in alerts.
    pub name: String,

    /// Chain adapter.
    pub chain: ChainKind,

    /// Node RPC endpoint.
    pub endpoint: String,

    /// Address encoding prefix, used when the chain does not report one.
    pub address_prefix: u16,

    /// Currency decimals; `fund_amount` is scaled by 10^decimals.
    pub decimals: u32,

    /// Whole currency units sent per request.
    pub fund_amount: u64,

    /// Maximum fundings per address in a rolling hour.
    pub limit_per_hour: u32,

    /// Minimum minutes between two fundings of the same address.
    pub min_wait_time_minutes: u64,

    /// Minimum minutes between two alerts of the same kind.
    pub notification_cooldown_minutes: u64,

    /// Seconds to wait for a broadcast transfer to finalize.
    pub finalization_timeout_secs: u64,

    /// Seconds allowed for establishing a node session.
    pub connect_timeout_secs: u64,

    /// Seconds allowed for connecting, reading the nonce and broadcasting.
    pub broadcast_timeout_secs: u64,

    /// EVM only: interval between finality polls, in milliseconds.
    pub poll_interval_ms: u64,

    /// EVM only: expected chain id. A node reporting a different one is refused.
    pub chain_id: Option<u64>,

    /// EVM only: count a transfer as final after this many blocks instead of
    /// waiting for the `finalized` tag.
    pub confirmations: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "testnet".to_string(),
            chain: ChainKind::Substrate,
            endpoint: "ws://127.0.0.1:9944".to_string(),
            address_prefix: 42,
            decimals: 12,
            fund_amount: 10,
            limit_per_hour: 2,
            min_wait_time_minutes: 10,
            notification_cooldown_minutes: 480, // 8 hours
            finalization_timeout_secs: 120,
            connect_timeout_secs: 30,
            broadcast_timeout_secs: 45,
            poll_interval_ms: 2_000,
            chain_id: None,
            confirmations: None,
        }
    }
}

/// Per-IP request limiting for the HTTP surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IpRateLimitConfig {
    /// Enable the per-IP limiter.
    pub enabled: bool,

    /// Length of the fixed window in minutes.
    pub window_minutes: u64,

    /// Requests allowed per IP per window.
    pub max_requests: u32,

    /// Number of reverse proxies in front of the service whose
    /// `X-Forwarded-For` entries are trusted.
    pub trusted_proxies: usize,
}

impl Default for IpRateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_minutes: 1,
            max_requests: 60,
            trusted_proxies: 1,
        }
    }
}

/// Operator alert delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Full webhook URL. When unset, the Slack token from the environment is
    /// used, and without either alerts are only logged.
    pub webhook_url: Option<String>,

    /// Webhook request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 5,
        }
    }
}

impl NotifierConfig {
    /// Resolve the webhook target from the configured URL or a Slack token.
    pub fn resolve_webhook(&self, slack_token: Option<&str>) -> Option<String> {
        self.webhook_url.clone().or_else(|| {
            slack_token
                .filter(|token| !token.is_empty())
                .map(|token| format!("https://hooks.slack.com/services/{}", token))
        })
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config: FaucetConfig = toml::from_str(
            r#"
            [network]
            name = "rococo"
            endpoint = "http://rpc.example:9933"
            "#,
        )
        .unwrap();

        assert_eq!(config.network.name, "rococo");
        assert_eq!(config.network.chain, ChainKind::Substrate);
        assert_eq!(config.network.notification_cooldown_minutes, 480);
        assert_eq!(config.network.limit_per_hour, 2);
        assert_eq!(config.server.bind_address, "0.0.0.0:3000");
        assert!(config.ip_rate_limit.enabled);
    }

    #[test]
    fn test_evm_network() {
        let config: FaucetConfig = toml::from_str(
            r#"
            [network]
            name = "sepolia"
            chain = "evm"
            endpoint = "https://rpc.sepolia.example"
            confirmations = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.network.chain, ChainKind::Evm);
        assert_eq!(config.network.confirmations, Some(12));
        assert!(toml::from_str::<FaucetConfig>("[network]\nchain = \"cosmos\"").is_err());
    }

    #[test]
    fn test_webhook_resolution() {
        let notifier = NotifierConfig::default();
        assert_eq!(notifier.resolve_webhook(None), None);
        assert_eq!(notifier.resolve_webhook(Some("")), None);
        assert_eq!(
            notifier.resolve_webhook(Some("T000/B000/XXX")).as_deref(),
            Some("https://hooks.slack.com/services/T000/B000/XXX")
        );

        let explicit = NotifierConfig {
            webhook_url: Some("http://alerts.internal/hook".into()),
            ..NotifierConfig::default()
        };
        assert_eq!(
            explicit.resolve_webhook(Some("ignored")).as_deref(),
            Some("http://alerts.internal/hook")
        );
    }
}
