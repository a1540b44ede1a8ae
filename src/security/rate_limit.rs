//! Per-IP request limiting.
//!
//! Fixed windows per client IP. The client IP is taken from
//! `X-Forwarded-For` only as far as the configured number of trusted proxies
//! reaches; beyond that the header is attacker-controlled.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::IpRateLimitConfig;
use crate::observability::metrics;

/// Above this many tracked IPs, expired windows are purged on insert.
const PURGE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct IpRateLimiter {
    windows: DashMap<IpAddr, Window>,
    window: Duration,
    max_requests: u32,
    trusted_proxies: usize,
}

impl IpRateLimiter {
    pub fn new(config: &IpRateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            window: Duration::from_secs(config.window_minutes * 60),
            max_requests: config.max_requests,
            trusted_proxies: config.trusted_proxies,
        }
    }

    /// Count a request from `ip`. On denial, returns the time until the
    /// window resets.
    pub fn check(&self, ip: IpAddr, now: Instant) -> Result<(), Duration> {
        if self.windows.len() > PURGE_THRESHOLD {
            let window = self.window;
            self.windows
                .retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let mut entry = self.windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            return Err(self.window.saturating_sub(elapsed));
        }
        entry.count += 1;
        Ok(())
    }

    pub fn trusted_proxies(&self) -> usize {
        self.trusted_proxies
    }
}

/// Client address after walking back `trusted_proxies` hops of
/// `X-Forwarded-For` from the socket peer.
pub fn resolve_client_ip(peer: IpAddr, forwarded_for: Option<&str>, trusted_proxies: usize) -> IpAddr {
    let mut chain: Vec<IpAddr> = forwarded_for
        .unwrap_or_default()
        .split(',')
        .filter_map(|hop| hop.trim().parse().ok())
        .collect();
    chain.push(peer);

    let index = chain.len().saturating_sub(1 + trusted_proxies);
    chain[index]
}

/// Middleware enforcing the per-IP limit.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<IpRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(peer) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return next.run(request).await;
    };

    let forwarded_for = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let client = resolve_client_ip(peer, forwarded_for, limiter.trusted_proxies());

    match limiter.check(client, Instant::now()) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(client = %client, "IP rate limit exceeded");
            metrics::record_rate_limited("ip");

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, please try again later.",
            )
                .into_response();
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}
