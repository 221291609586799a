//! governor.rs
//! Token-bucket packet-rate governor, consulted once per control tick.
//! - never blocks; the answer is advisory for the current tick only
//! - owned by exactly one loop, so it needs no locking
//! - long-run accepted rate converges to the configured rate

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PacketRateGovernor {
    tokens: f64,
    rate: f64,
    last_refill: Instant,
}

impl PacketRateGovernor {
    pub fn new(rate_hz: f64) -> Self {
        Self::new_at(rate_hz, Instant::now())
    }

    pub fn new_at(rate_hz: f64, now: Instant) -> Self {
        let rate = rate_hz.max(0.0);
        Self {
            tokens: rate,
            rate,
            last_refill: now,
        }
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[inline]
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Re-arm at a new rate with a full bucket.
    pub fn set_rate(&mut self, hz: f64) {
        self.set_rate_at(hz, Instant::now());
    }

    pub fn set_rate_at(&mut self, hz: f64, now: Instant) {
        self.rate = hz.max(0.0);
        self.tokens = self.rate;
        self.last_refill = now;
    }

    #[inline]
    pub fn permitted(&mut self) -> bool {
        self.permitted_at(Instant::now())
    }

    /// Refill by elapsed time, then spend one token if available.
    pub fn permitted_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;

        self.tokens = (self.tokens + elapsed * self.rate).min(self.rate);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
