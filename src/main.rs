//! Testnet faucet service.
//!
//! # Architecture Overview
//!
//! ```text
//!   GET /fund?to=addr
//!        │
//!        ▼
//!   ┌──────────┐   ┌───────────────┐   ┌────────────────────┐
//!   │   http   │──▶│    faucet     │──▶│       chain        │──▶ node
//!   │ +per-IP  │   │   pipeline    │   │ ConnectionManager  │
//!   └──────────┘   └──────┬────────┘   └────────────────────┘
//!                         │
//!            ┌────────────┼─────────────┐
//!            ▼            ▼             ▼
//!       ┌─────────┐  ┌─────────┐  ┌────────────┐
//!       │ limiter │  │ errors  │  │   notify   │──▶ webhook
//!       └─────────┘  └─────────┘  └────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use testnet_faucet::chain::evm::EvmConnector;
use testnet_faucet::chain::substrate::SubstrateConnector;
use testnet_faucet::chain::{ChainConnector, ChainError};
use testnet_faucet::clock::{Clock, SystemClock};
use testnet_faucet::config::{load_config, ChainKind, NetworkConfig, Secrets};
use testnet_faucet::lifecycle::{signals, startup, Shutdown};
use testnet_faucet::limiter::run_sweeper;
use testnet_faucet::observability::{logging, metrics};
use testnet_faucet::FaucetServer;

/// How often stale funding history is dropped.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Startup connection attempts before falling back to lazy connect.
const WARM_UP_ATTEMPTS: u32 = 5;

#[derive(Parser, Debug)]
#[command(name = "testnet-faucet", version, about = "Testnet currency faucet")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the HTTP bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Verbose logging for this crate and the HTTP layer.
    #[arg(long)]
    debug: bool,
}

/// Build the adapter for the configured chain.
fn build_connector(network: &NetworkConfig, secret: &str) -> Result<Arc<dyn ChainConnector>, ChainError> {
    Ok(match network.chain {
        ChainKind::Substrate => Arc::new(SubstrateConnector::from_secret_uri(
            secret,
            network.address_prefix,
        )?),
        ChainKind::Evm => Arc::new(
            EvmConnector::from_private_key(secret)?
                .with_poll_interval(Duration::from_millis(network.poll_interval_ms))
                .with_expected_chain_id(network.chain_id)
                .with_confirmations(network.confirmations),
        ),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    logging::init(&config.observability.log_level, cli.debug);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "testnet-faucet starting");

    let secrets = Secrets::from_env()?;

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let connector = build_connector(&config.network, &secrets.account_secret)?;

    let notifier = startup::build_notifier(&config.notifier, secrets.slack_token.as_deref())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = startup::assemble(&config, connector, notifier, clock.clone())?;

    if !state
        .connection
        .warm_up(WARM_UP_ATTEMPTS, Duration::from_millis(500), Duration::from_secs(10))
        .await
    {
        tracing::warn!(
            endpoint = %config.network.endpoint,
            "Node unreachable at startup, connecting on first request"
        );
    }

    let shutdown = Shutdown::new();
    tokio::spawn(run_sweeper(
        state.limiter.clone(),
        clock,
        SWEEP_INTERVAL,
        shutdown.subscribe(),
    ));
    tokio::spawn(signals::listen(shutdown.clone()));

    let pipeline = state.pipeline.clone();
    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let server = FaucetServer::new(&config, state);
    server.run(listener, shutdown.subscribe()).await?;

    pipeline.gate().flush().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
