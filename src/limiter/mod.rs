//! Per-address funding rate limiter.
//!
//! # Rules
//! - At most `hourly_cap` fundings per address in any trailing 60-minute window
//! - At least `cooldown` between two fundings of the same address
//! - An address with no history is never held back by the cooldown
//!
//! The cap is evaluated before the cooldown. An address that violates both is
//! reported with the cap's remaining time, whichever value is larger.
//!
//! # Concurrency
//! `check_and_record` runs entirely under the DashMap entry lock for the
//! address and never awaits, so two requests for the same address cannot both
//! pass the check before either one records its timestamp.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::clock::{Clock, Millis};
use crate::config::NetworkConfig;

/// Length of the rolling window the hourly cap applies to.
pub const WINDOW: Duration = Duration::from_secs(60 * 60);

/// Limits applied to every address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum admitted requests per address inside [`WINDOW`].
    pub hourly_cap: u32,
    /// Minimum spacing between two admitted requests of one address.
    pub cooldown: Duration,
}

impl From<&NetworkConfig> for RateLimitPolicy {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            hourly_cap: network.limit_per_hour,
            cooldown: Duration::from_secs(network.min_wait_time_minutes * 60),
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    HourlyCap,
    Cooldown,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::HourlyCap => "hourly_cap",
            DenyReason::Cooldown => "cooldown",
        }
    }
}

/// Outcome of [`RateLimiter::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Deny {
        remaining_secs: u64,
        reason: DenyReason,
    },
}

/// Owner of the per-address funding history.
#[derive(Debug)]
pub struct RateLimiter {
    /// Address -> admitted timestamps, oldest first.
    history: DashMap<String, Vec<Millis>>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            history: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Decide whether `address` may be funded at `now`, recording the event
    /// when it is admitted.
    pub fn check_and_record(&self, address: &str, now: Millis) -> Decision {
        let window_ms = WINDOW.as_millis() as u64;
        let cooldown_ms = self.policy.cooldown.as_millis() as u64;

        let mut entry = self.history.entry(address.to_string()).or_default();
        let history = entry.value_mut();
        history.retain(|&t| now.saturating_sub(t) <= window_ms);

        if history.len() >= self.policy.hourly_cap as usize {
            let earliest = history.first().copied().unwrap_or(now);
            let remaining = window_ms.saturating_sub(now.saturating_sub(earliest));
            return Decision::Deny {
                remaining_secs: ceil_secs(remaining),
                reason: DenyReason::HourlyCap,
            };
        }

        if let Some(&latest) = history.last() {
            let elapsed = now.saturating_sub(latest);
            if elapsed < cooldown_ms {
                return Decision::Deny {
                    remaining_secs: ceil_secs(cooldown_ms - elapsed),
                    reason: DenyReason::Cooldown,
                };
            }
        }

        history.push(now);
        Decision::Admit
    }

    /// Forget the most recently recorded funding of `address`.
    ///
    /// Returns false when there was nothing to remove.
    pub fn rollback(&self, address: &str) -> bool {
        match self.history.get_mut(address) {
            Some(mut history) => history.pop().is_some(),
            None => false,
        }
    }

    /// Drop every address whose history lies entirely outside the window.
    ///
    /// Returns the number of addresses removed.
    pub fn sweep(&self, now: Millis) -> usize {
        let window_ms = WINDOW.as_millis() as u64;
        let before = self.history.len();
        self.history.retain(|_, history| {
            history.retain(|&t| now.saturating_sub(t) <= window_ms);
            !history.is_empty()
        });
        before.saturating_sub(self.history.len())
    }

    /// Number of addresses currently holding history.
    pub fn tracked_addresses(&self) -> usize {
        self.history.len()
    }
}

fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

/// Periodically sweep stale addresses until shutdown is signalled.
pub async fn run_sweeper(
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; nothing can be stale yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limiter.sweep(clock.now_ms());
                if removed > 0 {
                    tracing::debug!(
                        removed,
                        tracked = limiter.tracked_addresses(),
                        "Swept stale funding history"
                    );
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("History sweeper stopping");
                break;
            }
        }
    }
}
