use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;

/// Below this many remaining requests the budget is reported as running low.
const LOW_REMAINING: u32 = 100;

/// Latest rate-limit figures reported by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitState {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Figures carried by the `X-RateLimit-*` response headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
        };

        let remaining = header("x-ratelimit-remaining")?;

        Some(Self {
            limit: header("x-ratelimit-limit").and_then(|v| u32::try_from(v).ok()),
            remaining: u32::try_from(remaining).ok(),
            reset_at: header("x-ratelimit-reset").and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }
}

/// Body of `GET /rate_limit`.
#[derive(Debug, Deserialize)]
pub(crate) struct RateLimitBody {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitBucket,
}

#[derive(Debug, Deserialize)]
struct RateLimitBucket {
    limit: u32,
    remaining: u32,
    reset: i64,
}

impl From<RateLimitBody> for RateLimitState {
    fn from(body: RateLimitBody) -> Self {
        let core = body.resources.core;
        Self {
            limit: Some(core.limit),
            remaining: Some(core.remaining),
            reset_at: Utc.timestamp_opt(core.reset, 0).single(),
        }
    }
}

/// Tracks the rate-limit budget across all requests of a session.
///
/// Bookkeeping only: requests are never delayed here, an exhausted budget
/// surfaces as a request error from the API itself.
pub struct RateLimiter {
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RateLimitState::default()),
        }
    }

    pub fn update_from_headers(&self, headers: &HeaderMap) {
        if let Some(latest) = RateLimitState::from_headers(headers) {
            self.record(latest);
        }
    }

    pub fn record(&self, latest: RateLimitState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = state.remaining;
        *state = latest;
        drop(state);

        if let Some(remaining) = latest.remaining {
            let crossed = previous.map(|p| p >= LOW_REMAINING).unwrap_or(true);
            if remaining < LOW_REMAINING && crossed {
                tracing::warn!(
                    "GitHub rate limit running low: {} requests left, resets at {:?}",
                    remaining,
                    latest.reset_at
                );
            }
        }
    }

    pub fn snapshot(&self) -> RateLimitState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
