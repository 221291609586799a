//! Per-loop timing diagnostics.
//!
//! Each control loop owns one `LoopStats` and feeds it once per tick: release jitter
//! against the nominal period, time spent doing work, overruns (work longer than a
//! period) and link traffic. Nothing here is shared, so nothing here locks.

use std::time::{Duration, Instant};

use average::{Estimate, Max, Variance};
use serde::Serialize;

use crate::network::message::Node;

pub struct LoopStats {
    node: Node,
    period: Duration,
    jitter_us: Variance,
    max_jitter_us: Max,
    work_us: Variance,
    max_work_us: Max,
    last_release: Option<Instant>,
    ticks: u64,
    overruns: u64,
    sent: u64,
    received: u64,
}

/// Flat view of a loop's statistics, one CSV row per loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopSummary {
    pub node: Node,
    pub period_us: u64,
    pub ticks: u64,
    pub overruns: u64,
    pub sent: u64,
    pub received: u64,
    pub superseded: u64,
    pub jitter_mean_us: f64,
    pub jitter_std_us: f64,
    pub jitter_max_us: f64,
    pub work_mean_us: f64,
    pub work_max_us: f64,
}

impl LoopStats {
    pub fn new(node: Node, period: Duration) -> Self {
        Self {
            node,
            period,
            jitter_us: Variance::new(),
            max_jitter_us: Max::new(),
            work_us: Variance::new(),
            max_work_us: Max::new(),
            last_release: None,
            ticks: 0,
            overruns: 0,
            sent: 0,
            received: 0,
        }
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[inline]
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Tick released at `now`; jitter is measured against the previous release.
    pub fn record_release(&mut self, now: Instant) {
        if let Some(last) = self.last_release {
            let actual = now.saturating_duration_since(last).as_secs_f64() * 1e6;
            let nominal = self.period.as_secs_f64() * 1e6;
            let jitter = (actual - nominal).abs();
            self.jitter_us.add(jitter);
            self.max_jitter_us.add(jitter);
        }
        self.last_release = Some(now);
        self.ticks += 1;
    }

    pub fn record_work(&mut self, elapsed: Duration) {
        let us = elapsed.as_secs_f64() * 1e6;
        self.work_us.add(us);
        self.max_work_us.add(us);
        if elapsed > self.period {
            self.overruns += 1;
        }
    }

    #[inline]
    pub fn record_traffic(&mut self, sent: bool, received: bool) {
        self.sent += u64::from(sent);
        self.received += u64::from(received);
    }

    pub fn summary(&self, superseded: u64) -> LoopSummary {
        let max_or_zero = |m: &Max, n: u64| if n == 0 { 0.0 } else { m.max() };
        LoopSummary {
            node: self.node,
            period_us: self.period.as_micros() as u64,
            ticks: self.ticks,
            overruns: self.overruns,
            sent: self.sent,
            received: self.received,
            superseded,
            jitter_mean_us: self.jitter_us.mean(),
            jitter_std_us: self.jitter_us.sample_variance().sqrt(),
            jitter_max_us: max_or_zero(&self.max_jitter_us, self.jitter_us.len()),
            work_mean_us: self.work_us.mean(),
            work_max_us: max_or_zero(&self.max_work_us, self.work_us.len()),
        }
    }
}
