use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

// ── Tiers ──

/// Route groups with independent per-IP budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Read-only catalogue and availability endpoints.
    Public,
    /// Booking creation, the strictest tier.
    Booking,
    /// Reference-scoped booking lookup and cancellation.
    Lookup,
    /// Admin scheduling endpoints.
    Admin,
}

impl Tier {
    fn limit(&self) -> (u32, Duration) {
        match self {
            Tier::Public => (60, Duration::from_secs(60)),
            Tier::Booking => (5, Duration::from_secs(300)),
            Tier::Lookup => (30, Duration::from_secs(60)),
            Tier::Admin => (120, Duration::from_secs(60)),
        }
    }
}

// ── Core rate limiter ──

/// In-memory per-IP rate limiter using sliding window counters, one
/// tracking map per tier.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    tiers: Arc<DashMap<Tier, DashMap<IpAddr, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a request from `ip` fits the tier's window.
    ///
    /// Returns `Ok(())` if allowed, `Err(retry_after_secs)` if limited.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> Result<(), u64> {
        let (max_requests, window) = tier.limit();
        let now = Instant::now();
        let window_start = now - window;

        let ip_map = self.tiers.entry(tier).or_default();
        let mut entry = ip_map.entry(ip).or_default();

        // Evict expired timestamps
        entry.retain(|t| *t > window_start);

        if entry.len() >= max_requests as usize {
            // Time until the oldest request falls out of the window
            let oldest = entry[0];
            let retry_after = (oldest + window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Remove stale entries (older than 2× window) from all tiers.
    /// Call periodically from a background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        for tier_entry in self.tiers.iter() {
            let (_, window) = tier_entry.key().limit();
            let cutoff = window * 2;
            tier_entry.value().retain(|_ip, timestamps| {
                timestamps.retain(|t| now.duration_since(*t) < cutoff);
                !timestamps.is_empty()
            });
        }
    }
}

// ── Middleware ──

/// Shared middleware; the tier rides along in the router state.
pub async fn rate_limit(
    State((limiter, tier)): State<(RateLimiter, Tier)>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check(tier, ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

/// Extract client IP from X-Forwarded-For (reverse proxy) or ConnectInfo.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first_ip) = forwarded.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Too many requests. Try again in {} seconds",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

// ── Tests ──
