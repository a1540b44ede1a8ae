//! Resilience helpers.
//!
//! Node connections are retried at startup with exponential backoff. Request
//! level retries are not generic: the only retried failure is the stale-session
//! case handled by [`crate::chain::ConnectionManager`].

pub mod backoff;

pub use backoff::backoff_delay;
