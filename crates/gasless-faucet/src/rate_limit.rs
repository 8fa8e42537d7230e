//! Per-client request limiting applied in front of every route.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::warn;

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Token bucket per client IP
pub struct ClientRateLimiter {
    limiter: KeyedLimiter,
}

impl ClientRateLimiter {
    /// Allow `requests` per minute per IP, with bursts of the same size
    pub fn per_minute(requests: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Take one request from `ip`'s budget. Returns `false` when exhausted.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Drop buckets that have fully refilled
    pub fn cleanup(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

/// Middleware rejecting clients over their budget with 429
pub async fn limit_by_client(
    State(limiter): State<Arc<ClientRateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.check(addr.ip()) {
        return next.run(request).await;
    }

    warn!("Rate limit exceeded for {}", addr.ip());
    let status = StatusCode::TOO_MANY_REQUESTS;
    let body = Json(json!({
        "error": "Too many requests, please try again later.",
        "status": status.as_u16()
    }));

    (status, body).into_response()
}
