//! The funding pipeline.
//!
//! # Ordering
//! 1. Address validation (never touches the limiter or the network)
//! 2. Rate limit check-and-record
//! 3. Nonce lookup, sign and broadcast through the [`ConnectionManager`],
//!    bounded by the broadcast timeout
//! 4. Bounded wait for finalization
//! 5. Classification of the dispatch result
//!
//! Steps 3 to 5, rollback and alerting run on a spawned task. A caller that
//! goes away (client disconnect, request timeout) does not cancel them.
//!
//! A failure after step 2 rolls the recorded funding back, so a request that
//! moved no funds does not count against the address. The exception is a
//! transfer already seen in a block: it may still finalize, so its record
//! stays. Operational failures are then offered to the [`NotificationGate`].

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chain::{
    ChainConnector, ChainSession, ConnectionManager, DispatchOutcome, SubmissionRequest,
    TxStatus, TxStatusStream,
};
use crate::clock::Clock;
use crate::config::NetworkConfig;
use crate::errors::{
    classify_broadcast_timeout, classify_chain_error, classify_outcome, classify_timeout,
    ClassifiedError, ErrorKind,
};
use crate::faucet::{planck_amount, AmountOverflow};
use crate::limiter::{Decision, RateLimiter};
use crate::notify::NotificationGate;
use crate::observability::metrics;

/// Funding parameters.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub network_name: String,
    /// Whole currency units per funding.
    pub fund_amount: u64,
    pub decimals: u32,
    /// Bound on connecting, reading the nonce and broadcasting.
    pub broadcast_timeout: Duration,
    pub finalization_timeout: Duration,
}

impl From<&NetworkConfig> for PipelineSettings {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            network_name: network.name.clone(),
            fund_amount: network.fund_amount,
            decimals: network.decimals,
            broadcast_timeout: Duration::from_secs(network.broadcast_timeout_secs),
            finalization_timeout: Duration::from_secs(network.finalization_timeout_secs),
        }
    }
}

/// A finalized funding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundReceipt {
    pub address: String,
    pub amount: u64,
    pub block: String,
    pub nonce: u64,
}

/// A failed submission, and whether the transfer had been seen in a block.
struct Failure {
    error: ClassifiedError,
    included: bool,
}

impl From<ClassifiedError> for Failure {
    fn from(error: ClassifiedError) -> Self {
        Self {
            error,
            included: false,
        }
    }
}

pub struct SubmissionPipeline {
    connector: Arc<dyn ChainConnector>,
    connection: Arc<ConnectionManager>,
    limiter: Arc<RateLimiter>,
    gate: Arc<NotificationGate>,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
    planck: u128,
}

impl SubmissionPipeline {
    pub fn new(
        connector: Arc<dyn ChainConnector>,
        connection: Arc<ConnectionManager>,
        limiter: Arc<RateLimiter>,
        gate: Arc<NotificationGate>,
        clock: Arc<dyn Clock>,
        settings: PipelineSettings,
    ) -> Result<Self, AmountOverflow> {
        let planck = planck_amount(settings.fund_amount, settings.decimals).ok_or(AmountOverflow {
            amount: settings.fund_amount,
            decimals: settings.decimals,
        })?;

        Ok(Self {
            connector,
            connection,
            limiter,
            gate,
            clock,
            settings,
            planck,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn gate(&self) -> &NotificationGate {
        &self.gate
    }

    /// Send the configured amount to `address`.
    pub async fn fund(self: &Arc<Self>, address: &str) -> Result<FundReceipt, ClassifiedError> {
        let address_format = self.connection.address_format();
        if let Err(reason) = self.connector.check_address(address, address_format) {
            tracing::debug!(address, reason = %reason, "Rejected address");
            metrics::record_fund_outcome(ErrorKind::AddressFormat.as_str());
            return Err(ClassifiedError::AddressFormat {
                address: address.to_string(),
                reason,
            });
        }

        if let Decision::Deny {
            remaining_secs,
            reason,
        } = self.limiter.check_and_record(address, self.clock.now_ms())
        {
            tracing::debug!(address, remaining_secs, reason = reason.as_str(), "Funding rate limited");
            metrics::record_rate_limited("address");
            metrics::record_fund_outcome(ErrorKind::RateLimited.as_str());
            return Err(ClassifiedError::RateLimited { remaining_secs });
        }

        let pipeline = Arc::clone(self);
        let owned = address.to_string();
        let settle = tokio::spawn(async move { pipeline.settle(&owned).await });

        match settle.await {
            Ok(result) => result,
            Err(e) => {
                self.limiter.rollback(address);
                tracing::error!(address, error = %e, "Funding task failed");
                Err(ClassifiedError::UnknownDispatch {
                    raw: format!("funding task failed: {}", e),
                })
            }
        }
    }

    /// Submit, then account for the result.
    async fn settle(&self, address: &str) -> Result<FundReceipt, ClassifiedError> {
        match self.submit(address).await {
            Ok(receipt) => {
                tracing::info!(
                    address,
                    amount = receipt.amount,
                    block = %receipt.block,
                    nonce = receipt.nonce,
                    "Funding finalized"
                );
                metrics::record_fund_outcome("success");
                Ok(receipt)
            }
            Err(Failure { error, included }) => {
                if included {
                    tracing::warn!(
                        address,
                        kind = error.kind().as_str(),
                        error = %error,
                        "Funding unconfirmed after inclusion, keeping its record"
                    );
                } else {
                    self.limiter.rollback(address);
                    tracing::warn!(
                        address,
                        kind = error.kind().as_str(),
                        error = %error,
                        "Funding failed"
                    );
                }
                metrics::record_fund_outcome(error.kind().as_str());
                if error.is_operational() {
                    self.gate.maybe_notify(&error);
                }
                Err(error)
            }
        }
    }

    async fn submit(&self, address: &str) -> Result<FundReceipt, Failure> {
        let amount = self.settings.fund_amount;
        let planck = self.planck;

        let broadcast = self.connection.execute(|session| async move {
            let nonce = session.account_next_index().await?;
            let request = SubmissionRequest {
                to: address.to_string(),
                amount,
                planck,
                nonce,
            };
            let stream = session.submit_transfer(&request).await?;
            Ok((session, request, stream))
        });

        let broadcast_timeout = self.settings.broadcast_timeout;
        let (session, request, stream) = tokio::time::timeout(broadcast_timeout, broadcast)
            .await
            .map_err(|_| classify_broadcast_timeout(broadcast_timeout))?
            .map_err(|e| classify_chain_error(&e))?;

        let timeout = self.settings.finalization_timeout;
        let started = Instant::now();
        let mut included = false;
        let finalized =
            tokio::time::timeout(timeout, await_finalization(session.as_ref(), stream, &mut included))
                .await;
        let (block, outcome) = match finalized {
            Ok(Ok(finalized)) => finalized,
            Ok(Err(error)) => return Err(Failure { error, included }),
            Err(_) => {
                return Err(Failure {
                    error: classify_timeout(timeout),
                    included,
                })
            }
        };
        metrics::record_finalization(started.elapsed());

        // A dispatch error means the transfer itself did not happen.
        classify_outcome(outcome)?;

        Ok(FundReceipt {
            address: request.to,
            amount: request.amount,
            block,
            nonce: request.nonce,
        })
    }
}

/// Follow `stream` until the transfer finalizes, setting `included` once it
/// is seen in a block.
///
/// Dispatch errors are decoded by the session that broadcast the transfer.
async fn await_finalization(
    session: &dyn ChainSession,
    mut stream: TxStatusStream,
    included: &mut bool,
) -> Result<(String, DispatchOutcome), ClassifiedError> {
    while let Some(status) = stream.next().await {
        let status = status.map_err(|e| classify_chain_error(&e))?;
        match status {
            TxStatus::Finalized {
                block,
                dispatch_error,
            } => {
                let outcome = match dispatch_error {
                    None => DispatchOutcome::Success,
                    Some(raw) => match session.decode_module_error(&raw) {
                        Some(info) => DispatchOutcome::ModuleError(info),
                        None => DispatchOutcome::UnclassifiedError {
                            raw: raw.to_string(),
                        },
                    },
                };
                return Ok((block, outcome));
            }
            TxStatus::InBlock { block } => {
                tracing::debug!(block = %block, "Transfer included");
                *included = true;
            }
            TxStatus::Dropped(reason) => {
                return Err(ClassifiedError::UnknownDispatch {
                    raw: format!("transaction dropped: {}", reason),
                });
            }
            TxStatus::Invalid(reason) => {
                return Err(ClassifiedError::UnknownDispatch {
                    raw: format!("transaction invalid: {}", reason),
                });
            }
            other => tracing::debug!(status = other.label(), "Transfer status"),
        }
    }

    Err(ClassifiedError::UnknownDispatch {
        raw: "status stream ended before finalization".to_string(),
    })
}
