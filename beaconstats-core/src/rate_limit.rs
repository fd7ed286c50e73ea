//! Token bucket for outbound chain head reports
//!
//! Capacity 1, refilled at 1 token per second, starting full. An event that
//! finds the bucket empty is dropped by the caller, never queued. The next
//! new head passes once the bucket refills.
//!
//! Credit is tracked as a [`Duration`] so the arithmetic is exact.

use std::time::Duration;
use tokio::time::Instant;

/// Rate limiter applied to forwarding head changes upstream
#[derive(Debug, Clone)]
pub struct UpdateRateLimiter {
    /// Time it takes to earn one token
    period: Duration,
    /// Bucket capacity in tokens
    burst: u32,
    /// Accumulated credit, capped at `period * burst`
    credit: Duration,
    /// Time of the last refill; unset until the first event
    last_refill: Option<Instant>,
}

impl Default for UpdateRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateRateLimiter {
    /// One event per second, burst of one
    pub fn new() -> Self {
        Self::with_period(Duration::from_secs(1), 1)
    }

    /// Limiter earning one token every `period`, holding at most `burst` tokens
    pub fn with_period(period: Duration, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            period,
            burst,
            credit: period * burst,
            last_refill: None,
        }
    }

    /// Take a token now if one is available
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Take a token at `now` if one is available
    pub fn allow_at(&mut self, now: Instant) -> bool {
        match self.last_refill {
            Some(last) if now > last => {
                self.credit = (self.credit + (now - last)).min(self.period * self.burst);
                self.last_refill = Some(now);
            }
            Some(_) => {}
            None => self.last_refill = Some(now),
        }

        if self.credit >= self.period {
            self.credit -= self.period;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available
    pub fn available(&self) -> u32 {
        if self.period.is_zero() {
            return self.burst;
        }
        (self.credit.as_nanos() / self.period.as_nanos()) as u32
    }
}
