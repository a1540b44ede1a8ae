//! Substrate chain adapter built on subxt.
//!
//! # Responsibilities
//! - Derive the sr25519 funding key from a mnemonic or secret URI
//! - Validate ss58 addresses against the network prefix
//! - Send `Balances::transfer_keep_alive` with an explicit nonce and follow
//!   its status subscription to finality
//! - Decode module errors through the session's runtime metadata
//!
//! # Chain Specifics
//! - The nonce comes from `system_accountNextIndex`, which counts
//!   transactions still in the pool
//! - Chain properties (`ss58Format`, `tokenDecimals`, `tokenSymbol`) are read
//!   once per session; decimals and symbols may be reported as arrays

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use subxt::backend::legacy::LegacyRpcMethods;
use subxt::backend::rpc::RpcClient;
use subxt::config::polkadot::PolkadotExtrinsicParamsBuilder;
use subxt::dynamic::Value as CallValue;
use subxt::error::DispatchError;
use subxt::tx::TxStatus as NodeTxStatus;
use subxt::utils::AccountId32;
use subxt::{OnlineClient, PolkadotConfig};
use subxt_signer::sr25519::Keypair;
use subxt_signer::SecretUri;

use crate::chain::{
    categorize_node_error, ss58, ChainConnector, ChainError, ChainProperties, ChainSession,
    ModuleErrorInfo, RawDispatchError, SubmissionRequest, TransportErrorKind, TxStatus,
    TxStatusStream,
};

const TRANSFER_PALLET: &str = "Balances";
const TRANSFER_CALL: &str = "transfer_keep_alive";

/// Connector for Substrate nodes over WebSocket RPC.
pub struct SubstrateConnector {
    keypair: Keypair,
    account: [u8; 32],
    address_prefix: u16,
}

impl SubstrateConnector {
    /// Create a connector from a mnemonic phrase or secret URI (`//Alice`,
    /// `<phrase>//hard/soft`).
    pub fn from_secret_uri(secret: &str, address_prefix: u16) -> Result<Self, ChainError> {
        let uri = SecretUri::from_str(secret)
            .map_err(|e| ChainError::Signer(format!("Invalid secret URI: {}", e)))?;
        let keypair = Keypair::from_uri(&uri)
            .map_err(|e| ChainError::Signer(format!("Invalid mnemonic: {}", e)))?;
        let account = keypair.public_key().0;

        tracing::info!(
            address = %ss58::encode(address_prefix, &account),
            "Funding account loaded"
        );

        Ok(Self {
            keypair,
            account,
            address_prefix,
        })
    }
}

#[async_trait]
impl ChainConnector for SubstrateConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainSession>, ChainError> {
        let connect_error = |message: String| ChainError::Connect {
            endpoint: endpoint.to_string(),
            message,
        };

        let rpc = RpcClient::from_insecure_url(endpoint)
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        let legacy = LegacyRpcMethods::<PolkadotConfig>::new(rpc.clone());
        let client = OnlineClient::<PolkadotConfig>::from_rpc_client(rpc)
            .await
            .map_err(|e| connect_error(e.to_string()))?;

        let properties = legacy
            .system_properties()
            .await
            .map(|raw| parse_properties(&raw))
            .map_err(|e| connect_error(e.to_string()))?;

        Ok(Arc::new(SubstrateSession {
            client,
            legacy,
            keypair: self.keypair.clone(),
            account: AccountId32(self.account),
            properties,
        }))
    }

    fn check_address(&self, address: &str, address_format: u16) -> Result<(), String> {
        let account = ss58::check(address, address_format).map_err(|e| e.to_string())?;
        if account == self.account {
            return Err("cannot fund the faucet account".to_string());
        }
        Ok(())
    }

    fn funding_account(&self) -> String {
        ss58::encode(self.address_prefix, &self.account)
    }
}

/// Session over one RPC client.
pub struct SubstrateSession {
    client: OnlineClient<PolkadotConfig>,
    legacy: LegacyRpcMethods<PolkadotConfig>,
    keypair: Keypair,
    account: AccountId32,
    properties: ChainProperties,
}

#[async_trait]
impl ChainSession for SubstrateSession {
    async fn chain_properties(&self) -> Result<ChainProperties, ChainError> {
        Ok(self.properties.clone())
    }

    async fn account_next_index(&self) -> Result<u64, ChainError> {
        self.legacy
            .system_account_next_index(&self.account)
            .await
            .map_err(|e| map_node_error(e.into()))
    }

    async fn submit_transfer(&self, request: &SubmissionRequest) -> Result<TxStatusStream, ChainError> {
        let (_, dest) = ss58::decode(&request.to).map_err(|e| {
            ChainError::transport(TransportErrorKind::Other, None, format!("invalid recipient: {}", e))
        })?;

        let call = subxt::dynamic::tx(
            TRANSFER_PALLET,
            TRANSFER_CALL,
            vec![
                CallValue::unnamed_variant("Id", [CallValue::from_bytes(dest)]),
                CallValue::u128(request.planck),
            ],
        );
        let params = PolkadotExtrinsicParamsBuilder::<PolkadotConfig>::new()
            .nonce(request.nonce)
            .build();

        let progress = self
            .client
            .tx()
            .sign_and_submit_then_watch(&call, &self.keypair, params)
            .await
            .map_err(map_node_error)?;

        tracing::debug!(nonce = request.nonce, to = %request.to, "Transfer broadcast");

        Ok(progress
            .then(|status| async move {
                match status {
                    Ok(NodeTxStatus::Validated { .. }) => Ok(TxStatus::Ready),
                    Ok(NodeTxStatus::InBestBlock(in_block)) => Ok(TxStatus::InBlock {
                        block: format!("{:?}", in_block.block_hash()),
                    }),
                    Ok(NodeTxStatus::InFinalizedBlock(in_block)) => {
                        let block = format!("{:?}", in_block.block_hash());
                        let dispatch_error = match in_block.wait_for_success().await {
                            Ok(_) => None,
                            Err(subxt::Error::Runtime(DispatchError::Module(module))) => {
                                let bytes = module.bytes();
                                Some(RawDispatchError::Module {
                                    index: bytes[0],
                                    error: [bytes[1], bytes[2], bytes[3], bytes[4]],
                                })
                            }
                            Err(subxt::Error::Runtime(other)) => {
                                Some(RawDispatchError::Other(other.to_string()))
                            }
                            Err(e) => return Err(ChainError::Subscription(e.to_string())),
                        };
                        Ok(TxStatus::Finalized {
                            block,
                            dispatch_error,
                        })
                    }
                    Ok(NodeTxStatus::Invalid { message }) => Ok(TxStatus::Invalid(message)),
                    Ok(NodeTxStatus::Dropped { message }) => Ok(TxStatus::Dropped(message)),
                    Ok(NodeTxStatus::Error { message }) => Err(ChainError::Subscription(message)),
                    Ok(_) => Ok(TxStatus::Broadcast),
                    Err(e) => Err(ChainError::Subscription(e.to_string())),
                }
            })
            .boxed())
    }

    fn decode_module_error(&self, raw: &RawDispatchError) -> Option<ModuleErrorInfo> {
        let RawDispatchError::Module { index, error } = raw else {
            return None;
        };

        let metadata = self.client.metadata();
        let pallet = metadata.pallet_by_index(*index)?;
        let variant = pallet.error_variant_by_index(error[0])?;

        Some(ModuleErrorInfo {
            section: section_name(pallet.name()),
            method: variant.name.clone(),
            name: variant.name.clone(),
        })
    }
}

fn map_node_error(err: subxt::Error) -> ChainError {
    let message = err.to_string();
    ChainError::transport(categorize_node_error(None, &message), None, message)
}

/// Pallet names are reported in lower camel case (`Balances` → `balances`).
fn section_name(pallet: &str) -> String {
    let mut chars = pallet.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Read `system_properties`. Multi-token chains report arrays; the first
/// entry is the native token.
fn parse_properties(raw: &Map<String, Value>) -> ChainProperties {
    let first = |value: &Value| match value {
        Value::Array(values) => values.first().cloned(),
        other => Some(other.clone()),
    };

    ChainProperties {
        address_format: raw
            .get("ss58Format")
            .and_then(Value::as_u64)
            .and_then(|v| u16::try_from(v).ok()),
        token_decimals: raw
            .get("tokenDecimals")
            .and_then(first)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok()),
        token_symbol: raw
            .get("tokenSymbol")
            .and_then(first)
            .and_then(|v| v.as_str().map(str::to_string)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";

    fn connector() -> SubstrateConnector {
        SubstrateConnector::from_secret_uri("//Alice", 42).unwrap()
    }

    #[test]
    fn test_dev_account_from_uri() {
        assert_eq!(connector().funding_account(), ALICE);

        let polkadot = SubstrateConnector::from_secret_uri("//Alice", 0).unwrap();
        assert!(polkadot.funding_account().starts_with('1'));
    }

    #[test]
    fn test_check_address() {
        let connector = connector();
        assert_eq!(connector.check_address(BOB, 42), Ok(()));
        assert_eq!(
            connector.check_address(BOB, 0),
            Err("address prefix 42 does not match network prefix 0".to_string())
        );
        assert_eq!(
            connector.check_address(ALICE, 42),
            Err("cannot fund the faucet account".to_string())
        );
        assert_eq!(
            connector.check_address("0x70997970C51812dc3A010C7d01b50e0d17dc79C8", 42),
            Err("invalid base58 encoding".to_string())
        );
    }

    #[test]
    fn test_parse_properties() {
        let raw = json!({"ss58Format": 42, "tokenDecimals": 12, "tokenSymbol": "WND"});
        let Value::Object(raw) = raw else { unreachable!() };
        assert_eq!(
            parse_properties(&raw),
            ChainProperties {
                address_format: Some(42),
                token_decimals: Some(12),
                token_symbol: Some("WND".into()),
            }
        );

        let raw = json!({"tokenDecimals": [18, 12], "tokenSymbol": ["ACA", "AUSD"]});
        let Value::Object(raw) = raw else { unreachable!() };
        let properties = parse_properties(&raw);
        assert_eq!(properties.address_format, None);
        assert_eq!(properties.token_decimals, Some(18));
        assert_eq!(properties.token_symbol.as_deref(), Some("ACA"));
    }

    #[test]
    fn test_section_name() {
        assert_eq!(section_name("Balances"), "balances");
        assert_eq!(section_name("XcmPallet"), "xcmPallet");
        assert_eq!(section_name(""), "");
    }
}
