//! Classified funding errors.
//!
//! # Taxonomy (checked in this order)
//! 1. Address fails validation → `AddressFormat`
//! 2. Rate limiter denies → `RateLimited`
//! 3. Transport failure of category `CannotPayFees` → `InsufficientFunds`
//! 4. Module error named `InsufficientBalance` → `InsufficientFunds`
//! 5. Any other module error → `ModuleDispatch`
//! 6. `BadSignature` surviving the reconnect → `TransientConnection`
//! 7. Anything else → `UnknownDispatch`
//!
//! User errors (1, 2) become 400 responses with an explanation and are never
//! sent to operators. Everything else is a 500 with no internal detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

use crate::chain::{ChainError, DispatchOutcome, TransportErrorKind};

/// Module error name that means the funding account ran dry.
const INSUFFICIENT_BALANCE: &str = "InsufficientBalance";

/// Variant tag of a [`ClassifiedError`], used as the alert dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AddressFormat,
    RateLimited,
    InsufficientFunds,
    ModuleDispatch,
    TransientConnection,
    UnknownDispatch,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AddressFormat => "address_format",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::ModuleDispatch => "module_dispatch",
            ErrorKind::TransientConnection => "transient_connection",
            ErrorKind::UnknownDispatch => "unknown_dispatch",
        }
    }
}

/// Why a funding request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifiedError {
    #[error("invalid address {address}: {reason}")]
    AddressFormat { address: String, reason: String },

    #[error("rate limited, retry in {remaining_secs} seconds")]
    RateLimited { remaining_secs: u64 },

    #[error("funding account has insufficient balance")]
    InsufficientFunds,

    #[error("dispatch failed in {section}.{method}")]
    ModuleDispatch { section: String, method: String },

    #[error("node connection unusable after reconnect: {message}")]
    TransientConnection { message: String },

    #[error("unknown dispatch failure: {raw}")]
    UnknownDispatch { raw: String },
}

impl ClassifiedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassifiedError::AddressFormat { .. } => ErrorKind::AddressFormat,
            ClassifiedError::RateLimited { .. } => ErrorKind::RateLimited,
            ClassifiedError::InsufficientFunds => ErrorKind::InsufficientFunds,
            ClassifiedError::ModuleDispatch { .. } => ErrorKind::ModuleDispatch,
            ClassifiedError::TransientConnection { .. } => ErrorKind::TransientConnection,
            ClassifiedError::UnknownDispatch { .. } => ErrorKind::UnknownDispatch,
        }
    }

    /// Whether operators should hear about this error.
    pub fn is_operational(&self) -> bool {
        !matches!(
            self,
            ClassifiedError::AddressFormat { .. } | ClassifiedError::RateLimited { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_operational() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        }
    }
}

/// Classify the dispatch result of a finalized transfer.
pub fn classify_outcome(outcome: DispatchOutcome) -> Result<(), ClassifiedError> {
    match outcome {
        DispatchOutcome::Success => Ok(()),
        DispatchOutcome::ModuleError(info) if info.name == INSUFFICIENT_BALANCE => {
            Err(ClassifiedError::InsufficientFunds)
        }
        DispatchOutcome::ModuleError(info) => Err(ClassifiedError::ModuleDispatch {
            section: info.section,
            method: info.method,
        }),
        DispatchOutcome::UnclassifiedError { raw } => Err(ClassifiedError::UnknownDispatch { raw }),
    }
}

/// Classify a failure raised while talking to the node.
pub fn classify_chain_error(err: &ChainError) -> ClassifiedError {
    match err.transport_kind() {
        Some(TransportErrorKind::CannotPayFees) => ClassifiedError::InsufficientFunds,
        Some(TransportErrorKind::BadSignature) => ClassifiedError::TransientConnection {
            message: err.to_string(),
        },
        _ => ClassifiedError::UnknownDispatch {
            raw: err.to_string(),
        },
    }
}

/// A transfer that never reached finality in time.
pub fn classify_timeout(waited: Duration) -> ClassifiedError {
    ClassifiedError::UnknownDispatch {
        raw: format!("transfer not finalized within {} seconds", waited.as_secs()),
    }
}

/// A transfer whose nonce lookup or broadcast never completed in time.
pub fn classify_broadcast_timeout(waited: Duration) -> ClassifiedError {
    ClassifiedError::UnknownDispatch {
        raw: format!("transfer not broadcast within {} seconds", waited.as_secs()),
    }
}

impl IntoResponse for ClassifiedError {
    fn into_response(self) -> Response {
        let message = match &self {
            ClassifiedError::AddressFormat { address, reason } => {
                format!("Error sending to address {}: {}", address, reason)
            }
            ClassifiedError::RateLimited { remaining_secs } => format!(
                "Address has reached the limit, please try again in {} seconds",
                remaining_secs
            ),
            _ => "Server Error. Please try again later".to_string(),
        };

        (self.status_code(), message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ModuleErrorInfo;

    fn module_error(name: &str) -> DispatchOutcome {
        DispatchOutcome::ModuleError(ModuleErrorInfo {
            section: "balances".into(),
            method: "transferKeepAlive".into(),
            name: name.into(),
        })
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(classify_outcome(DispatchOutcome::Success), Ok(()));
        assert_eq!(
            classify_outcome(module_error("InsufficientBalance")),
            Err(ClassifiedError::InsufficientFunds)
        );
        assert_eq!(
            classify_outcome(module_error("ExistentialDeposit")),
            Err(ClassifiedError::ModuleDispatch {
                section: "balances".into(),
                method: "transferKeepAlive".into(),
            })
        );
        assert_eq!(
            classify_outcome(DispatchOutcome::UnclassifiedError { raw: "BadOrigin".into() }),
            Err(ClassifiedError::UnknownDispatch { raw: "BadOrigin".into() })
        );
    }

    #[test]
    fn test_chain_error_classification() {
        let fees = ChainError::transport(TransportErrorKind::CannotPayFees, Some(1010), "fees");
        assert_eq!(classify_chain_error(&fees), ClassifiedError::InsufficientFunds);

        let stale = ChainError::transport(TransportErrorKind::BadSignature, None, "bad signature");
        assert_eq!(classify_chain_error(&stale).kind(), ErrorKind::TransientConnection);

        let other = ChainError::ConnectTimeout(30);
        assert_eq!(classify_chain_error(&other).kind(), ErrorKind::UnknownDispatch);
    }

    #[test]
    fn test_user_errors_are_not_operational() {
        let rate = ClassifiedError::RateLimited { remaining_secs: 5 };
        assert!(!rate.is_operational());
        assert_eq!(rate.status_code(), StatusCode::BAD_REQUEST);

        assert!(ClassifiedError::InsufficientFunds.is_operational());
        assert_eq!(
            classify_timeout(Duration::from_secs(120)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            classify_broadcast_timeout(Duration::from_secs(45)),
            ClassifiedError::UnknownDispatch {
                raw: "transfer not broadcast within 45 seconds".into()
            }
        );
    }

    #[tokio::test]
    async fn test_server_errors_hide_detail() {
        let response = ClassifiedError::UnknownDispatch {
            raw: "secret node detail".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Server Error. Please try again later");
    }
}
