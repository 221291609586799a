//! Couples packet rate to link latency: every extra packet per second costs a fixed
//! slice of delay on top of a constant floor, `delay(rate) = per_hz * rate + constant`.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDelay {
    per_hz: Duration,
    constant: Duration,
}

impl Default for RateDelay {
    fn default() -> Self {
        Self::new(Duration::from_micros(1_000), Duration::from_micros(2_000))
    }
}

impl RateDelay {
    pub fn new(per_hz: Duration, constant: Duration) -> Self {
        Self { per_hz, constant }
    }

    pub fn delay(&self, rate_hz: u32) -> Duration {
        self.per_hz
            .saturating_mul(rate_hz)
            .saturating_add(self.constant)
    }
}
