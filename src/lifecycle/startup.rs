//! Startup orchestration.
//!
//! Builds the component graph from a validated config. The chain connector,
//! notifier and clock are passed in so tests can substitute scripted ones.

use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainConnector, ConnectionManager, ConnectionSettings};
use crate::clock::Clock;
use crate::config::{FaucetConfig, NotifierConfig};
use crate::faucet::{AmountOverflow, PipelineSettings, SubmissionPipeline};
use crate::http::AppState;
use crate::limiter::{RateLimitPolicy, RateLimiter};
use crate::notify::{AlertContext, LogNotifier, NotificationGate, Notifier, NotifyError, SlackNotifier};

/// Pick the alert channel: a webhook when one is configured, the log otherwise.
pub fn build_notifier(
    config: &NotifierConfig,
    slack_token: Option<&str>,
) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config.resolve_webhook(slack_token) {
        Some(url) => {
            tracing::info!("Operator alerts go to the webhook");
            let notifier = SlackNotifier::new(url, Duration::from_secs(config.timeout_secs))?;
            Ok(Arc::new(notifier))
        }
        None => {
            tracing::warn!("No webhook configured, operator alerts are only logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Wire the pipeline and its collaborators.
pub fn assemble(
    config: &FaucetConfig,
    connector: Arc<dyn ChainConnector>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
) -> Result<AppState, AmountOverflow> {
    let network = &config.network;

    let connection = Arc::new(ConnectionManager::new(
        connector.clone(),
        ConnectionSettings::from(network),
    ));
    let limiter = Arc::new(RateLimiter::new(RateLimitPolicy::from(network)));

    let gate = Arc::new(NotificationGate::new(
        notifier,
        AlertContext {
            network_name: network.name.clone(),
            funding_account: connector.funding_account(),
        },
        Duration::from_secs(network.notification_cooldown_minutes * 60),
        clock.clone(),
    ));

    let pipeline = Arc::new(SubmissionPipeline::new(
        connector,
        connection.clone(),
        limiter.clone(),
        gate,
        clock,
        PipelineSettings::from(network),
    )?);

    tracing::info!(
        network = %network.name,
        fund_amount = network.fund_amount,
        limit_per_hour = network.limit_per_hour,
        min_wait_time_minutes = network.min_wait_time_minutes,
        "Faucet assembled"
    );

    Ok(AppState {
        pipeline,
        connection,
        limiter,
        network_name: network.name.clone(),
    })
}
