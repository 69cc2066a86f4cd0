//! Per-app token bucket gating scale events.
//!
//! Terminal status updates trigger a scale of the affected app; the bucket
//! keeps a crash-looping app from hammering the scale path. Apps without a
//! registered bucket are not limited.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use armada_id::AppId;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    /// Tokens refilled per second.
    rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rate: f64) -> Self {
        let capacity = Self::capacity(rate);
        Self {
            rate,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    // Capacity never drops below one token, whatever the rate.
    fn capacity(rate: f64) -> f64 {
        rate.max(1.0)
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(Self::capacity(self.rate));
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Rate limiter for terminal-status-triggered scaling.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<AppId, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the bucket for an app.
    pub fn set_permits(&self, app_id: &AppId, rate_per_sec: f64) {
        debug!(app_id = %app_id, rate_per_sec, "Setting scale rate limit");
        self.lock().insert(app_id.clone(), Bucket::new(rate_per_sec));
    }

    /// Takes one token if available. Unregistered apps always succeed.
    pub fn try_acquire(&self, app_id: &AppId) -> bool {
        match self.lock().get_mut(app_id) {
            Some(bucket) => bucket.try_acquire(),
            None => true,
        }
    }

    /// Drops the bucket for a stopped app.
    pub fn remove(&self, app_id: &AppId) {
        self.lock().remove(app_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AppId, Bucket>> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }
}
