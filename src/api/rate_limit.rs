//! Request throttling using a per-key request history.
//!
//! Every throttle scope has a rate of `N` requests per period. For each
//! `(scope, client)` pair the timestamps of recent requests are kept; a
//! request is refused when `N` of them still fall inside the period.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ThrottleConfig;
use crate::AppState;

use super::auth::extract_bearer;
use super::error::ApiError;

/// Named rate-limit buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleScope {
    /// Anonymous callers on every route
    Anon,
    /// Authenticated callers on every route
    User,
    /// Product list/create
    Products,
    /// Order viewset
    Orders,
}

impl ThrottleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleScope::Anon => "anon",
            ThrottleScope::User => "user",
            ThrottleScope::Products => "products",
            ThrottleScope::Orders => "orders",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "anon" => Some(ThrottleScope::Anon),
            "user" => Some(ThrottleScope::User),
            "products" => Some(ThrottleScope::Products),
            "orders" => Some(ThrottleScope::Orders),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateParseError {
    #[error("invalid throttle rate {0:?}: expected <count>/<period>")]
    Format(String),
    #[error("unknown throttle period {0:?}: expected second, minute, hour or day")]
    Period(String),
}

/// `N` requests per `duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub num_requests: u32,
    pub duration: Duration,
}

impl FromStr for Rate {
    type Err = RateParseError;

    /// Parses `"5/minute"`; only the first letter of the period matters
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (num, period) = s
            .split_once('/')
            .ok_or_else(|| RateParseError::Format(s.to_string()))?;

        let num_requests: u32 = num
            .trim()
            .parse()
            .map_err(|_| RateParseError::Format(s.to_string()))?;

        let seconds = match period.trim().chars().next() {
            Some('s') => 1,
            Some('m') => 60,
            Some('h') => 60 * 60,
            Some('d') => 24 * 60 * 60,
            _ => return Err(RateParseError::Period(period.to_string())),
        };

        Ok(Rate {
            num_requests,
            duration: Duration::from_secs(seconds),
        })
    }
}

/// Who is being throttled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    User(i64),
    Ip(IpAddr),
}

/// Information about rate limit status
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Maximum requests per window
    pub limit: u32,
}

/// Thread-safe throttle state keyed by scope and identity
#[derive(Debug)]
pub struct RateLimiter {
    /// Request timestamps, newest first
    histories: DashMap<(ThrottleScope, Identity), VecDeque<Instant>>,
    rates: HashMap<ThrottleScope, Rate>,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(config: &ThrottleConfig) -> Result<Self, RateParseError> {
        let mut rates = HashMap::new();
        for (name, rate) in &config.rates {
            match ThrottleScope::from_name(name) {
                Some(scope) => {
                    rates.insert(scope, rate.parse()?);
                }
                None => tracing::warn!(scope = %name, "Ignoring rate for unknown throttle scope"),
            }
        }

        Ok(Self {
            histories: DashMap::new(),
            rates,
            enabled: config.enabled,
        })
    }

    /// Check if a request should be allowed and record it if so.
    /// Returns `Err(wait)` with the time until a slot frees up when refused.
    pub fn check(&self, scope: ThrottleScope, identity: Identity) -> Result<RateLimitInfo, Duration> {
        self.check_at(scope, identity, Instant::now())
    }

    fn check_at(
        &self,
        scope: ThrottleScope,
        identity: Identity,
        now: Instant,
    ) -> Result<RateLimitInfo, Duration> {
        // Scopes without a configured rate are not throttled
        let rate = match (self.enabled, self.rates.get(&scope)) {
            (true, Some(rate)) => *rate,
            _ => {
                return Ok(RateLimitInfo {
                    remaining: u32::MAX,
                    limit: u32::MAX,
                })
            }
        };

        let mut history = self.histories.entry((scope, identity)).or_default();

        // Drop requests that have left the window
        while let Some(oldest) = history.back() {
            if now.duration_since(*oldest) >= rate.duration {
                history.pop_back();
            } else {
                break;
            }
        }

        if history.len() >= rate.num_requests as usize {
            let wait = match history.back() {
                Some(oldest) => rate.duration.saturating_sub(now.duration_since(*oldest)),
                None => rate.duration,
            };
            return Err(wait);
        }

        history.push_front(now);
        Ok(RateLimitInfo {
            remaining: rate.num_requests - history.len() as u32,
            limit: rate.num_requests,
        })
    }

    /// Drop histories whose newest request is older than the longest window
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let longest = self
            .rates
            .values()
            .map(|r| r.duration)
            .max()
            .unwrap_or_default();

        self.histories.retain(|_, history| {
            history
                .front()
                .is_some_and(|newest| now.duration_since(*newest) < longest)
        });
    }

    /// Get the number of tracked entries (for monitoring)
    pub fn entry_count(&self) -> usize {
        self.histories.len()
    }
}

/// Extract client IP from proxy headers, then the socket address
fn extract_client_ip(request: &Request<Body>) -> IpAddr {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            // Take the first IP in the list (original client)
            if let Some(ip_str) = value.split(',').next() {
                if let Ok(ip) = ip_str.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            if let Ok(ip) = value.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Authenticated user id when the request carries a valid access token,
/// otherwise the client IP. Token problems are left to the auth extractors.
fn request_identity(state: &AppState, request: &Request<Body>) -> Identity {
    extract_bearer(request.headers())
        .ok()
        .flatten()
        .and_then(|token| state.jwt.access_user_id(token).ok())
        .map(Identity::User)
        .unwrap_or_else(|| Identity::Ip(extract_client_ip(request)))
}

/// `anon`/`user` throttling for every API route
pub async fn throttle_default(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    throttle_with_scope(state, request, next, None).await
}

/// Throttling for the product list
pub async fn throttle_products(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    throttle_with_scope(state, request, next, Some(ThrottleScope::Products)).await
}

/// Throttling for the order viewset
pub async fn throttle_orders(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    throttle_with_scope(state, request, next, Some(ThrottleScope::Orders)).await
}

async fn throttle_with_scope(
    state: Arc<AppState>,
    request: Request<Body>,
    next: Next,
    scope: Option<ThrottleScope>,
) -> Result<Response, ApiError> {
    let identity = request_identity(&state, &request);
    let scope = scope.unwrap_or(match identity {
        Identity::User(_) => ThrottleScope::User,
        Identity::Ip(_) => ThrottleScope::Anon,
    });

    match state.rate_limiter.check(scope, identity) {
        Ok(info) => {
            let mut response = next.run(request).await;
            if info.limit != u32::MAX {
                let headers = response.headers_mut();
                headers.insert("X-RateLimit-Limit", HeaderValue::from(info.limit));
                headers.insert("X-RateLimit-Remaining", HeaderValue::from(info.remaining));
            }
            Ok(response)
        }
        Err(wait) => {
            tracing::info!(scope = scope.as_str(), ?identity, "Request throttled");
            Err(ApiError::throttled(wait.as_secs().max(1)))
        }
    }
}

/// Spawn a background task to periodically clean up idle throttle histories
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                "Throttle cleanup complete, {} entries remaining",
                rate_limiter.entry_count()
            );
        }
    });
}
