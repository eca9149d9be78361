//! Per-address sliding-window rate limiting.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::ApiError;

/// Sliding-window limiter keyed on the remote address's host portion.
///
/// Each key holds a time-ordered list of admitted request timestamps,
/// pruned to the window on every check; the critical section is a short
/// append-and-prune under one mutex. Sharing one instance between routes
/// makes them draw from one pool, which is how `/deploy` and `/rollback`
/// are limited together.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    limit: usize,
    window: Duration,
    requests: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                limit,
                window,
                requests: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Record a request for `key` if it fits in the window. Rejected
    /// requests do not consume quota.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self
            .inner
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stamps = requests.entry(key.to_string()).or_default();
        stamps.retain(|t| now.duration_since(*t) < self.inner.window);
        if stamps.len() >= self.inner.limit {
            return false;
        }
        stamps.push(now);
        true
    }
}

/// Reject over-limit requests with 429 before the handler runs.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = remote_host(&req);
    if !limiter.allow(&key) {
        return ApiError::RateLimited.into_response();
    }
    next.run(req).await
}

/// Host portion of the remote address, as recorded by ConnectInfo.
fn remote_host(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
    }

    #[test]
    fn window_expiry_frees_quota() {
        let limiter = RateLimiter::new(2, Duration::from_millis(30));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.allow("10.0.0.1"));
    }

    #[test]
    fn rejected_requests_do_not_consume_quota() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        for _ in 0..10 {
            assert!(!limiter.allow("10.0.0.1"));
        }
        std::thread::sleep(Duration::from_millis(60));
        // Only the two admitted requests occupied the window.
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
    }
}
