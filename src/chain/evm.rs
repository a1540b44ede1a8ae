//! EVM chain adapter built on alloy.
//!
//! # Responsibilities
//! - Sign native-currency transfers with the funding key
//! - Report status as Broadcast → InBlock → Finalized by polling the receipt
//!   and then either the `finalized` block tag or a confirmation depth
//! - Map JSON-RPC errors onto [`TransportErrorKind`]
//!
//! # Chain Specifics
//! - Addresses carry no prefix, so the configured default format applies
//! - A reverted transfer finalizes with an unclassified dispatch error; there
//!   are no module errors to decode

use alloy::eips::BlockNumberOrTag;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::TransportError;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{
    categorize_node_error, ChainConnector, ChainError, ChainProperties, ChainSession,
    ModuleErrorInfo, RawDispatchError, SubmissionRequest, TransportErrorKind, TxStatus,
    TxStatusStream,
};

/// When a mined transfer counts as final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finality {
    /// The node's `finalized` block tag has reached the transfer's block.
    /// On proof-of-stake networks this trails the head by about two epochs.
    FinalizedTag,
    /// The transfer's block is buried under this many blocks, itself included.
    Confirmations(u64),
}

impl Finality {
    fn reached(&self, block: u64, head: u64) -> bool {
        match self {
            Finality::FinalizedTag => head >= block,
            Finality::Confirmations(depth) => head.saturating_add(1).saturating_sub(block) >= *depth,
        }
    }
}

/// Connector for EVM JSON-RPC nodes.
pub struct EvmConnector {
    signer: PrivateKeySigner,
    expected_chain_id: Option<u64>,
    poll_interval: Duration,
    finality: Finality,
}

impl EvmConnector {
    /// Create a connector from a hex-encoded private key (with or without 0x).
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, ChainError> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| ChainError::Signer(format!("Invalid private key format: {}", e)))?;

        tracing::info!(address = %signer.address(), "Funding account loaded");

        Ok(Self {
            signer,
            expected_chain_id: None,
            poll_interval: Duration::from_secs(2),
            finality: Finality::FinalizedTag,
        })
    }

    /// Count a transfer as final after `confirmations` blocks instead of
    /// waiting for the `finalized` tag.
    pub fn with_confirmations(mut self, confirmations: Option<u64>) -> Self {
        self.finality = confirmations.map_or(Finality::FinalizedTag, Finality::Confirmations);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Refuse nodes that report a different chain id.
    pub fn with_expected_chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.expected_chain_id = chain_id;
        self
    }
}

#[async_trait]
impl ChainConnector for EvmConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainSession>, ChainError> {
        let connect_error = |message: String| ChainError::Connect {
            endpoint: endpoint.to_string(),
            message,
        };

        let url: url::Url = endpoint
            .parse()
            .map_err(|e| connect_error(format!("invalid RPC URL: {}", e)))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .connect_http(url);
        let provider = Arc::new(provider) as Arc<dyn Provider + Send + Sync>;

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| connect_error(e.to_string()))?;

        if let Some(expected) = self.expected_chain_id {
            if expected != chain_id {
                return Err(connect_error(format!(
                    "chain id mismatch: expected {}, got {}",
                    expected, chain_id
                )));
            }
        }

        Ok(Arc::new(EvmSession {
            provider,
            from: self.signer.address(),
            chain_id,
            poll_interval: self.poll_interval,
            finality: self.finality,
        }))
    }

    fn check_address(&self, address: &str, _address_format: u16) -> Result<(), String> {
        let hex = address
            .strip_prefix("0x")
            .ok_or_else(|| "expected a 0x-prefixed hex address".to_string())?;

        let parsed: Address = address.parse().map_err(|e| format!("{}", e))?;

        let mixed_case = hex.chars().any(|c| c.is_ascii_uppercase())
            && hex.chars().any(|c| c.is_ascii_lowercase());
        if mixed_case && Address::parse_checksummed(address, None).is_err() {
            return Err("invalid address checksum".to_string());
        }

        if parsed.is_zero() {
            return Err("cannot fund the zero address".to_string());
        }
        if parsed == self.signer.address() {
            return Err("cannot fund the faucet account".to_string());
        }
        Ok(())
    }

    fn funding_account(&self) -> String {
        self.signer.address().to_string()
    }
}

/// Session over one HTTP provider.
pub struct EvmSession {
    provider: Arc<dyn Provider + Send + Sync>,
    from: Address,
    chain_id: u64,
    poll_interval: Duration,
    finality: Finality,
}

#[async_trait]
impl ChainSession for EvmSession {
    async fn chain_properties(&self) -> Result<ChainProperties, ChainError> {
        Ok(ChainProperties {
            address_format: None,
            token_decimals: Some(18),
            token_symbol: None,
        })
    }

    async fn account_next_index(&self) -> Result<u64, ChainError> {
        self.provider
            .get_transaction_count(self.from)
            .pending()
            .await
            .map_err(map_rpc_error)
    }

    async fn submit_transfer(&self, request: &SubmissionRequest) -> Result<TxStatusStream, ChainError> {
        let to: Address = request.to.parse().map_err(|e| {
            ChainError::transport(TransportErrorKind::Other, None, format!("invalid recipient: {}", e))
        })?;

        let tx = TransactionRequest::default()
            .with_from(self.from)
            .with_to(to)
            .with_value(U256::from(request.planck))
            .with_nonce(request.nonce)
            .with_chain_id(self.chain_id);

        let pending = self.provider.send_transaction(tx).await.map_err(map_rpc_error)?;
        let tx_hash = *pending.tx_hash();

        tracing::debug!(tx_hash = %tx_hash, nonce = request.nonce, to = %to, "Transfer broadcast");

        Ok(watch_finality(
            self.provider.clone(),
            tx_hash,
            self.poll_interval,
            self.finality,
        ))
    }

    fn decode_module_error(&self, _raw: &RawDispatchError) -> Option<ModuleErrorInfo> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Broadcast,
    AwaitReceipt,
    AwaitFinality { block: u64, reverted: bool },
    Done,
}

/// Next phase after a receipt. A receipt without a block number belongs to
/// a transaction that is still pending.
fn receipt_phase(block_number: Option<u64>, succeeded: bool) -> Option<Phase> {
    block_number.map(|block| Phase::AwaitFinality {
        block,
        reverted: !succeeded,
    })
}

/// Poll the node until `tx_hash` is included in a final block.
fn watch_finality(
    provider: Arc<dyn Provider + Send + Sync>,
    tx_hash: TxHash,
    poll_interval: Duration,
    finality: Finality,
) -> TxStatusStream {
    stream::unfold(Phase::Broadcast, move |phase| {
        let provider = provider.clone();
        async move {
            match phase {
                Phase::Broadcast => Some((Ok(TxStatus::Broadcast), Phase::AwaitReceipt)),
                Phase::AwaitReceipt => loop {
                    match provider.get_transaction_receipt(tx_hash).await {
                        Ok(Some(receipt)) => {
                            if let Some(next @ Phase::AwaitFinality { block, .. }) =
                                receipt_phase(receipt.block_number, receipt.status())
                            {
                                let status = TxStatus::InBlock {
                                    block: block.to_string(),
                                };
                                return Some((Ok(status), next));
                            }
                            tokio::time::sleep(poll_interval).await;
                        }
                        Ok(_) => tokio::time::sleep(poll_interval).await,
                        Err(e) => return Some((Err(map_rpc_error(e)), Phase::Done)),
                    }
                },
                Phase::AwaitFinality { block, reverted } => loop {
                    match final_head(provider.as_ref(), finality).await {
                        Ok(Some(head)) if finality.reached(block, head) => {
                            let dispatch_error = reverted
                                .then(|| RawDispatchError::Other("execution reverted".to_string()));
                            let status = TxStatus::Finalized {
                                block: block.to_string(),
                                dispatch_error,
                            };
                            return Some((Ok(status), Phase::Done));
                        }
                        Ok(_) => tokio::time::sleep(poll_interval).await,
                        Err(e) => return Some((Err(map_rpc_error(e)), Phase::Done)),
                    }
                },
                Phase::Done => None,
            }
        }
    })
    .boxed()
}

/// The block number `finality` is measured against.
async fn final_head(
    provider: &(dyn Provider + Send + Sync),
    finality: Finality,
) -> Result<Option<u64>, TransportError> {
    match finality {
        Finality::FinalizedTag => Ok(provider
            .get_block_by_number(BlockNumberOrTag::Finalized)
            .await?
            .map(|head| head.header.number)),
        Finality::Confirmations(_) => provider.get_block_number().await.map(Some),
    }
}

fn map_rpc_error(err: TransportError) -> ChainError {
    let (code, message) = match err.as_error_resp() {
        Some(payload) => (Some(payload.code), payload.message.to_string()),
        None => (None, err.to_string()),
    };
    ChainError::transport(categorize_node_error(code, &message), code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key; never funded outside local chains.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcaee784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    fn connector() -> EvmConnector {
        EvmConnector::from_private_key(DEV_KEY).unwrap()
    }

    #[test]
    fn test_key_parsing() {
        assert_eq!(connector().funding_account(), DEV_ADDRESS);
        assert!(matches!(
            EvmConnector::from_private_key("not-a-key"),
            Err(ChainError::Signer(_))
        ));
    }

    #[test]
    fn test_check_address() {
        let connector = connector();
        assert_eq!(connector.check_address(RECIPIENT, 42), Ok(()));
        assert_eq!(connector.check_address(&RECIPIENT.to_lowercase(), 42), Ok(()));

        assert!(connector.check_address("70997970C51812dc3A010C7d01b50e0d17dc79C8", 42).is_err());
        assert!(connector.check_address("0x1234", 42).is_err());
        assert_eq!(
            connector.check_address("0x70997970c51812dc3A010C7d01b50e0d17dc79C8", 42),
            Err("invalid address checksum".to_string())
        );
        assert_eq!(
            connector.check_address("0x0000000000000000000000000000000000000000", 42),
            Err("cannot fund the zero address".to_string())
        );
        assert_eq!(
            connector.check_address(DEV_ADDRESS, 42),
            Err("cannot fund the faucet account".to_string())
        );
    }

    #[test]
    fn test_pending_receipt_is_not_inclusion() {
        assert_eq!(receipt_phase(None, true), None);
        assert_eq!(
            receipt_phase(Some(7), true),
            Some(Phase::AwaitFinality {
                block: 7,
                reverted: false
            })
        );
        assert_eq!(
            receipt_phase(Some(7), false),
            Some(Phase::AwaitFinality {
                block: 7,
                reverted: true
            })
        );
    }

    #[test]
    fn test_finality_depth() {
        assert!(Finality::FinalizedTag.reached(100, 100));
        assert!(!Finality::FinalizedTag.reached(100, 99));

        // The inclusion block is the first confirmation.
        let three = Finality::Confirmations(3);
        assert!(!three.reached(100, 101));
        assert!(three.reached(100, 102));
        assert!(!three.reached(100, 50));
    }

    #[test]
    fn test_confirmations_override_finalized_tag() {
        assert_eq!(connector().finality, Finality::FinalizedTag);
        assert_eq!(
            connector().with_confirmations(Some(12)).finality,
            Finality::Confirmations(12)
        );
        assert_eq!(connector().with_confirmations(None).finality, Finality::FinalizedTag);
    }
}
