//! Structured logging.
//!
//! # Design Decisions
//! - Uses the tracing crate with a registry + EnvFilter + fmt layer
//! - `RUST_LOG` wins over the configured level when set
//! - `--debug` raises this crate and tower_http to debug

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(level: &str, debug: bool) -> String {
    if debug {
        "testnet_faucet=debug,tower_http=debug".to_string()
    } else {
        format!("testnet_faucet={level},tower_http=info,warn")
    }
}

/// Install the global subscriber.
pub fn init(level: &str, debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(level, debug).into());

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(
            default_directive("warn", false),
            "testnet_faucet=warn,tower_http=info,warn"
        );
        assert!(default_directive("info", true).starts_with("testnet_faucet=debug"));
        assert!(default_directive("info", false).parse::<EnvFilter>().is_ok());
    }
}
