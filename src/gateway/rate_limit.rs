//! Token-bucket rate limiting middleware — adapted from the teacher's
//! `api/rate_limit.rs`. The [`RateLimiter`]/[`Bucket`] shape is
//! domain-agnostic and carried over unchanged; only the middleware's state
//! type moves from the teacher's `RouterState` to this crate's
//! [`GatewayState`].
//!
//! One bucket per client IP. Tokens refill steadily at `rpm / 60`
//! tokens/second and the burst cap is `ceil(rpm / 2)`.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Instant,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use super::GatewayState;

#[derive(Debug, Clone)]
struct Bucket {
    last_refill: Instant,
    tokens: f64,
}

/// Shared rate limiter: one token bucket per client IP address.
pub struct RateLimiter {
    pub rpm: u32,
    fill_rate: f64,
    capacity: f64,
    buckets: DashMap<IpAddr, Bucket>,
}

impl RateLimiter {
    pub fn new(rpm: u32) -> Self {
        let capacity = ((rpm + 1) / 2) as f64;
        let fill_rate = rpm as f64 / 60.0;
        Self { rpm, fill_rate, capacity, buckets: DashMap::new() }
    }

    /// Attempt to consume one token for `ip`. `Err(retry_after_secs)` when
    /// the bucket is empty.
    pub fn check(&self, ip: IpAddr) -> Result<(), f64> {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(ip).or_insert_with(|| Bucket { last_refill: now, tokens: self.capacity });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let new_tokens = (bucket.tokens + elapsed * self.fill_rate).min(self.capacity);

        if new_tokens < 1.0 {
            let retry_after = (1.0 - new_tokens) / self.fill_rate;
            return Err(retry_after.ceil());
        }

        bucket.last_refill = now;
        bucket.tokens = new_tokens - 1.0;
        Ok(())
    }
}

/// Axum middleware that enforces per-IP rate limits. No-ops when
/// `state.rate_limiter` is `None`. Falls back to `127.0.0.1` if
/// `ConnectInfo` is unavailable (e.g. in tests).
pub async fn rate_limit_middleware(State(state): State<Arc<GatewayState>>, req: Request, next: Next) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        let ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0.ip())
            .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));

        if let Err(retry_after) = limiter.check(ip) {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    ("retry-after", retry_after.to_string()),
                    ("x-ratelimit-limit", limiter.rpm.to_string()),
                    ("x-ratelimit-policy", format!("{};w=60", limiter.rpm)),
                    ("content-type", "text/plain".into()),
                ],
                "Rate limit exceeded. Please retry after the indicated delay.",
            )
                .into_response();
        }
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(a: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, a))
    }

    #[test]
    fn fresh_bucket_allows_up_to_capacity() {
        let limiter = RateLimiter::new(60);
        let test_ip = ip(1);
        let allowed = (0..limiter.capacity as usize).filter(|_| limiter.check(test_ip).is_ok()).count();
        assert_eq!(allowed, limiter.capacity as usize);
    }

    #[test]
    fn exceeding_capacity_returns_retry_after() {
        let limiter = RateLimiter::new(60);
        let test_ip = ip(2);
        for _ in 0..limiter.capacity as usize {
            let _ = limiter.check(test_ip);
        }
        let result = limiter.check(test_ip);
        assert!(result.is_err());
        assert!(result.unwrap_err() >= 1.0);
    }

    #[test]
    fn different_ips_have_independent_buckets() {
        let limiter = RateLimiter::new(4);
        let ip_a = ip(10);
        let ip_b = ip(11);
        let _ = limiter.check(ip_a);
        let _ = limiter.check(ip_a);
        assert!(limiter.check(ip_b).is_ok());
    }
}
