//! Client-side budget for the Reddit OAuth API.
//!
//! Reddit allows 100 queries per minute per OAuth client. A token bucket
//! spreads requests over that window, and a 429 answer pauses the bucket
//! for the advertised `Retry-After`.

use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Upper bound on a single pause, whatever the server asks for.
pub const MAX_PAUSE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    pub requests: u32,
    pub per: Duration,
    /// Requests that may go out back to back before pacing starts.
    pub burst: u32,
}

impl Budget {
    pub const fn reddit_oauth() -> Self {
        Self {
            requests: 100,
            per: Duration::from_secs(60),
            burst: 10,
        }
    }

    fn tokens_per_second(&self) -> f64 {
        f64::from(self.requests) / self.per.as_secs_f64()
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::reddit_oauth()
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
    paused_until: Option<Instant>,
}

impl Bucket {
    fn refill(&mut self, now: Instant, budget: &Budget) {
        let earned = now.duration_since(self.refilled_at).as_secs_f64() * budget.tokens_per_second();
        self.tokens = (self.tokens + earned).min(f64::from(budget.burst));
        self.refilled_at = now;
    }
}

/// Snapshot for logs and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub available: u32,
    pub burst: u32,
    pub requests_per_minute: u32,
    pub paused: bool,
}

#[derive(Debug)]
pub struct RateLimiter {
    budget: Budget,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(budget: Budget) -> Self {
        Self {
            budget,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(budget.burst),
                refilled_at: Instant::now(),
                paused_until: None,
            }),
        }
    }

    /// Take a token if one is there; otherwise say how long to wait.
    async fn try_take(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock().await;
        let now = Instant::now();

        if let Some(until) = bucket.paused_until {
            if until > now {
                return Err(until - now);
            }
            bucket.paused_until = None;
        }

        bucket.refill(now, &self.budget);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(missing / self.budget.tokens_per_second()))
        }
    }

    /// Wait until one request may be sent. Returns the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        while let Err(wait) = self.try_take().await {
            debug!("Rate limit budget exhausted, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        started.elapsed()
    }

    /// Hold all requests for `retry_after` (at most [`MAX_PAUSE`]) and drain
    /// the bucket.
    pub async fn pause(&self, retry_after: Duration) {
        let retry_after = retry_after.min(MAX_PAUSE);
        warn!("Pausing Reddit requests for {:?}", retry_after);
        let now = Instant::now();
        let until = now.checked_add(retry_after).unwrap_or(now);
        let mut bucket = self.bucket.lock().await;
        bucket.tokens = 0.0;
        bucket.refilled_at = until;
        bucket.paused_until = Some(until);
    }

    pub async fn status(&self) -> RateLimitStatus {
        let mut bucket = self.bucket.lock().await;
        let now = Instant::now();
        let paused = bucket.paused_until.is_some_and(|until| until > now);
        if !paused {
            bucket.refill(now, &self.budget);
        }

        RateLimitStatus {
            available: bucket.tokens.floor() as u32,
            burst: self.budget.burst,
            requests_per_minute: (self.budget.tokens_per_second() * 60.0).round() as u32,
            paused,
        }
    }
}
