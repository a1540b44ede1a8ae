//! Funding requests end to end.
//!
//! # Data Flow
//! ```text
//! GET /fund?to=<address>
//!     → pipeline.rs: check address → rate limit → nonce + broadcast
//!       → await finalization → classify → rollback on failure → alert
//! ```

pub mod pipeline;

use thiserror::Error;

pub use pipeline::{FundReceipt, PipelineSettings, SubmissionPipeline};

/// The configured amount does not fit a 128-bit balance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{amount} with {decimals} decimals overflows a 128-bit balance")]
pub struct AmountOverflow {
    pub amount: u64,
    pub decimals: u32,
}

/// `amount * 10^decimals`, or `None` on overflow.
pub fn planck_amount(amount: u64, decimals: u32) -> Option<u128> {
    10u128
        .checked_pow(decimals)
        .and_then(|scale| scale.checked_mul(amount as u128))
}
