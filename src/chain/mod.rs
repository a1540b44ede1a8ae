//! Chain client abstraction.
//!
//! # Data Flow
//! ```text
//! SubmissionPipeline
//!     → connection.rs (ConnectionManager: lazy connect, reconnect-once)
//!     → ChainSession (nonce, broadcast, status stream, error decoding)
//!     → substrate.rs (subxt, ss58 addresses, pallet errors)
//!       or evm.rs (alloy, hex addresses, receipt polling)
//! ```
//!
//! # Design Decisions
//! - The pipeline only sees the traits below; node specifics stay in adapters
//! - Transport failures carry a structural [`TransportErrorKind`], so no caller
//!   above the adapter inspects error strings
//! - A session decodes dispatch errors itself, since decoding depends on the
//!   metadata of the node that produced them

pub mod connection;
pub mod evm;
pub mod ss58;
pub mod substrate;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use connection::{ConnectionManager, ConnectionSettings, ConnectionState};

/// Category of a transport-level failure reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The node rejected the signature; usually a stale session after a runtime
    /// upgrade or a node restart. Recovered by reconnecting.
    BadSignature,
    /// The funding account cannot pay the transaction fees.
    CannotPayFees,
    /// Anything else.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::BadSignature => write!(f, "bad_signature"),
            TransportErrorKind::CannotPayFees => write!(f, "cannot_pay_fees"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Errors raised while talking to the node.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Could not establish a session.
    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    /// Establishing a session took too long.
    #[error("connection attempt timed out after {0} seconds")]
    ConnectTimeout(u64),

    /// A request on an established session failed.
    #[error("transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        code: Option<i64>,
        message: String,
    },

    /// The transaction status stream failed.
    #[error("status subscription failed: {0}")]
    Subscription(String),

    /// The funding key is unusable.
    #[error("signer error: {0}")]
    Signer(String),
}

impl ChainError {
    pub fn transport(kind: TransportErrorKind, code: Option<i64>, message: impl Into<String>) -> Self {
        ChainError::Transport {
            kind,
            code,
            message: message.into(),
        }
    }

    /// Whether this failure is cured by reconnecting.
    pub fn is_transient(&self) -> bool {
        self.transport_kind() == Some(TransportErrorKind::BadSignature)
    }

    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            ChainError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Sort a node error message into a [`TransportErrorKind`].
///
/// This is the only place node error text is inspected; both adapters funnel
/// their RPC failures through it.
pub(crate) fn categorize_node_error(code: Option<i64>, message: &str) -> TransportErrorKind {
    let message = message.to_ascii_lowercase();
    if message.contains("bad signature")
        || message.contains("invalid signature")
        || message.contains("invalid sender")
    {
        TransportErrorKind::BadSignature
    } else if code == Some(CANNOT_PAY_FEES_CODE)
        || message.contains("inability to pay some fees")
        || message.contains("insufficient funds")
    {
        TransportErrorKind::CannotPayFees
    } else {
        TransportErrorKind::Other
    }
}

/// JSON-RPC error code Substrate nodes use for invalid transactions.
const CANNOT_PAY_FEES_CODE: i64 = 1010;

/// Properties the node reports about its chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainProperties {
    /// Address encoding prefix, when the chain has one.
    pub address_format: Option<u16>,
    pub token_decimals: Option<u32>,
    pub token_symbol: Option<String>,
}

/// One transfer attempt. Built fresh for every attempt and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    /// Recipient address, as supplied by the requester.
    pub to: String,
    /// Whole currency units.
    pub amount: u64,
    /// `amount * 10^decimals`.
    pub planck: u128,
    /// Account nonce the transfer is signed with.
    pub nonce: u64,
}

/// Raw dispatch error attached to a finalized transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawDispatchError {
    /// Error raised by a runtime module, identified by pallet index and code.
    Module { index: u8, error: [u8; 4] },
    /// Any other dispatch failure.
    Other(String),
}

impl fmt::Display for RawDispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawDispatchError::Module { index, error } => {
                write!(f, "Module {{ index: {}, error: 0x{:02x}{:02x}{:02x}{:02x} }}",
                    index, error[0], error[1], error[2], error[3])
            }
            RawDispatchError::Other(message) => write!(f, "{}", message),
        }
    }
}

/// Decoded module error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleErrorInfo {
    pub section: String,
    pub method: String,
    pub name: String,
}

/// Lifecycle of a broadcast transaction as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Ready,
    Broadcast,
    InBlock { block: String },
    Finalized {
        block: String,
        dispatch_error: Option<RawDispatchError>,
    },
    Dropped(String),
    Invalid(String),
}

impl TxStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TxStatus::Ready => "ready",
            TxStatus::Broadcast => "broadcast",
            TxStatus::InBlock { .. } => "in_block",
            TxStatus::Finalized { .. } => "finalized",
            TxStatus::Dropped(_) => "dropped",
            TxStatus::Invalid(_) => "invalid",
        }
    }
}

/// Stream of status updates for one broadcast transaction.
pub type TxStatusStream = BoxStream<'static, Result<TxStatus, ChainError>>;

/// Result of a finalized transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    ModuleError(ModuleErrorInfo),
    UnclassifiedError { raw: String },
}

/// An established session with a node.
#[async_trait]
pub trait ChainSession: Send + Sync {
    /// Properties of the connected chain.
    async fn chain_properties(&self) -> Result<ChainProperties, ChainError>;

    /// Next usable nonce of the funding account, including pending transactions.
    async fn account_next_index(&self) -> Result<u64, ChainError>;

    /// Sign and broadcast a transfer, returning its status updates.
    async fn submit_transfer(&self, request: &SubmissionRequest) -> Result<TxStatusStream, ChainError>;

    /// Translate a module error using this session's chain metadata.
    fn decode_module_error(&self, raw: &RawDispatchError) -> Option<ModuleErrorInfo>;

    /// Release the session. Calls still holding it may fail afterwards.
    async fn disconnect(&self) {}
}

/// Factory for sessions plus the chain-specific pieces that need no session.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    /// Establish a new session with the node at `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainSession>, ChainError>;

    /// Validate `address` for the chain's address format. The error is a
    /// human-readable reason shown to the requester.
    fn check_address(&self, address: &str, address_format: u16) -> Result<(), String>;

    /// Address of the account funds are drawn from.
    fn funding_account(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_bad_signature_is_transient() {
        assert!(ChainError::transport(TransportErrorKind::BadSignature, None, "x").is_transient());
        assert!(!ChainError::transport(TransportErrorKind::CannotPayFees, Some(1010), "x").is_transient());
        assert!(!ChainError::ConnectTimeout(5).is_transient());
        assert_eq!(ChainError::Subscription("closed".into()).transport_kind(), None);
    }

    #[test]
    fn test_raw_dispatch_display() {
        let raw = RawDispatchError::Module {
            index: 5,
            error: [2, 0, 0, 0],
        };
        assert_eq!(raw.to_string(), "Module { index: 5, error: 0x02000000 }");
        assert_eq!(RawDispatchError::Other("BadOrigin".into()).to_string(), "BadOrigin");
    }

    #[test]
    fn test_node_error_categories() {
        assert_eq!(
            categorize_node_error(Some(-32000), "Transaction has a bad signature"),
            TransportErrorKind::BadSignature
        );
        assert_eq!(
            categorize_node_error(None, "Rpc error: Invalid Transaction (1010): Transaction has a bad signature"),
            TransportErrorKind::BadSignature
        );
        assert_eq!(
            categorize_node_error(Some(-32000), "insufficient funds for gas * price + value"),
            TransportErrorKind::CannotPayFees
        );
        assert_eq!(
            categorize_node_error(Some(1010), "Invalid Transaction"),
            TransportErrorKind::CannotPayFees
        );
        assert_eq!(
            categorize_node_error(None, "Invalid Transaction: Inability to pay some fees (e.g. account balance too low)"),
            TransportErrorKind::CannotPayFees
        );
        assert_eq!(categorize_node_error(Some(-32000), "nonce too low"), TransportErrorKind::Other);
        assert_eq!(categorize_node_error(None, "connection reset"), TransportErrorKind::Other);
    }
}
