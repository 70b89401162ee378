//! Token-bucket rate limiting with runtime pause/resume.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// A classic token bucket: `limit` tokens per second refill up to `burst`.
///
/// An infinite limit admits everything; a zero limit with zero burst admits
/// nothing. The bucket starts full.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    limit: f64,
    burst: u32,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// Full bucket refilling at `limit` tokens per second.
    pub fn new(limit: f64, burst: u32) -> Self {
        Self {
            limit,
            burst,
            tokens: f64::from(burst),
            last: Instant::now(),
        }
    }

    /// Refill rate in tokens per second.
    pub fn limit(&self) -> f64 {
        self.limit
    }

    /// Bucket capacity.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Tokens available at `now`, without consuming any.
    pub fn tokens_at(&self, now: Instant) -> f64 {
        if self.limit.is_infinite() {
            return f64::from(self.burst);
        }
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        (self.tokens + elapsed * self.limit).min(f64::from(self.burst))
    }

    fn advance(&mut self, now: Instant) {
        self.tokens = self.tokens_at(now);
        if now > self.last {
            self.last = now;
        }
    }

    /// Take one token if available.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        if self.limit.is_infinite() {
            return true;
        }
        self.advance(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Change the refill rate, settling tokens accrued so far at the old rate.
    pub fn set_limit_at(&mut self, now: Instant, limit: f64) {
        self.advance(now);
        self.limit = limit;
    }

    /// Change the capacity; surplus tokens are discarded.
    pub fn set_burst_at(&mut self, now: Instant, burst: u32) {
        self.advance(now);
        self.burst = burst;
        self.tokens = self.tokens.min(f64::from(burst));
    }
}

/// Events per second for "once every `interval`"; a zero interval is unlimited.
pub fn every(interval: Duration) -> f64 {
    if interval.is_zero() {
        f64::INFINITY
    } else {
        1.0 / interval.as_secs_f64()
    }
}

/// Point-in-time view of a [`RateController`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateState {
    pub configured_per_sec: f64,
    pub current_per_sec: f64,
    pub burst: u32,
}

/// A token bucket that remembers its configured rate so it can be paused
/// (rate and burst forced to zero) and later resumed.
///
/// The effective rate is always either zero or the configured rate.
pub struct RateController {
    configured_limit: f64,
    configured_burst: u32,
    bucket: RwLock<TokenBucket>,
}

impl RateController {
    /// One event per `interval`, up to `burst` at once.
    pub fn new(interval: Duration, burst: u32) -> Self {
        let limit = every(interval);
        Self {
            configured_limit: limit,
            configured_burst: burst,
            bucket: RwLock::new(TokenBucket::new(limit, burst)),
        }
    }

    /// Non-blocking; consumes a token when the action may proceed.
    pub fn allow(&self) -> bool {
        self.bucket
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .allow_at(Instant::now())
    }

    /// Force rate and burst to zero. Idempotent.
    pub fn pause(&self) {
        let now = Instant::now();
        let mut bucket = self.bucket.write().unwrap_or_else(PoisonError::into_inner);
        bucket.set_limit_at(now, 0.0);
        bucket.set_burst_at(now, 0);
    }

    /// Restore the configured rate and burst. Idempotent; the bucket
    /// refills from empty.
    pub fn resume(&self) {
        let now = Instant::now();
        let mut bucket = self.bucket.write().unwrap_or_else(PoisonError::into_inner);
        bucket.set_limit_at(now, self.configured_limit);
        bucket.set_burst_at(now, self.configured_burst);
    }

    /// Whether the effective rate is zero.
    pub fn is_paused(&self) -> bool {
        self.bucket.read().unwrap_or_else(PoisonError::into_inner).limit() == 0.0
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> f64 {
        self.bucket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens_at(Instant::now())
    }

    /// Display string: `Paused`, `Unlimited`, or `<rate> / <burst>`.
    pub fn status(&self) -> String {
        let bucket = self.bucket.read().unwrap_or_else(PoisonError::into_inner);
        let limit = bucket.limit();
        if limit == 0.0 {
            "Paused".to_string()
        } else if limit.is_infinite() {
            "Unlimited".to_string()
        } else {
            format!("{} / {}", limit, bucket.burst())
        }
    }

    /// Configured and effective rate plus current burst.
    pub fn state(&self) -> RateState {
        let bucket = self.bucket.read().unwrap_or_else(PoisonError::into_inner);
        RateState {
            configured_per_sec: self.configured_limit,
            current_per_sec: bucket.limit(),
            burst: bucket.burst(),
        }
    }
}
