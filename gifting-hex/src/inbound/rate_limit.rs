//! Per-owner rate limiting using Governor.
//!
//! Runs after authentication and keys each token bucket by the resolved
//! owner, so rotating API keys does not reset an owner's budget.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde_json::json;

use gifting_types::OwnerId;

use super::handlers::AuthenticatedOwner;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter state shared across requests.
pub struct RateLimiterState {
    limiters: DashMap<OwnerId, Arc<DirectLimiter>>,
    quota: Quota,
    period: Duration,
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

impl RateLimiterState {
    /// Allows a burst of `requests` per `period` for each owner.
    /// Zero values are raised to one.
    pub fn new(requests: u32, period: Duration) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        let period = period.max(Duration::from_millis(1));
        let quota = Quota::with_period(period / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiters: DashMap::new(),
            quota,
            period,
        }
    }

    /// Returns true if the owner may proceed.
    pub fn check(&self, owner: OwnerId) -> bool {
        let limiter = self
            .limiters
            .entry(owner)
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone();

        limiter.check().is_ok()
    }
}

/// Rate limiting middleware. Requests without an authenticated owner pass
/// through untouched.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(AuthenticatedOwner(owner)) = request.extensions().get::<AuthenticatedOwner>().copied()
    else {
        return next.run(request).await;
    };

    if !limiter.check(owner) {
        tracing::warn!(owner_id = %owner, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded. Please try again later.",
                "retry_after_seconds": limiter.period.as_secs()
            })),
        )
            .into_response();
    }

    next.run(request).await
}
