//! link.rs
//! Point-to-point master/slave link built from two independent delay channels.
//! - one shared delay/jitter profile, adjustable at runtime by the operator
//! - every send samples its own delay: Normal(base, jitter), clamped at zero
//! - the profile sits behind an RwLock so readers never observe a torn update

use std::time::{Duration, Instant};

use log::debug;
use parking_lot::RwLock;
use rand_distr::{Distribution, Normal};

use crate::network::{
    channel::DelayChannel,
    message::{CommandMessage, FeedbackMessage},
};

/// Upper bound the operator can dial the base delay up to.
pub const MAX_LINK_DELAY: Duration = Duration::from_millis(200);

/// Delay/jitter profile shared by both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkProfile {
    pub base_delay: Duration,
    pub jitter_std_dev: Duration,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            base_delay: Duration::ZERO,
            jitter_std_dev: Duration::ZERO,
        }
    }
}

impl LinkProfile {
    /// Draw one per-packet delay from the profile.
    pub fn sample_delay(&self) -> Duration {
        if self.jitter_std_dev.is_zero() {
            return self.base_delay;
        }

        let mean_us = self.base_delay.as_secs_f64() * 1e6;
        let std_us = self.jitter_std_dev.as_secs_f64() * 1e6;
        match Normal::new(mean_us, std_us) {
            Ok(dist) => {
                let us = dist.sample(&mut rand::rng()).max(0.0);
                Duration::from_micros(us as u64)
            }
            Err(_) => self.base_delay,
        }
    }
}

/// Master → slave command leg plus slave → master feedback leg.
pub struct Link {
    profile: RwLock<LinkProfile>,
    max_delay: Duration,
    m2s: DelayChannel<CommandMessage>,
    s2m: DelayChannel<FeedbackMessage>,
}

impl Link {
    pub fn new(profile: LinkProfile, max_delay: Duration) -> Self {
        let max_delay = max_delay.min(MAX_LINK_DELAY);
        let profile = LinkProfile {
            base_delay: profile.base_delay.min(max_delay),
            ..profile
        };
        Self {
            profile: RwLock::new(profile),
            max_delay,
            m2s: DelayChannel::new(),
            s2m: DelayChannel::new(),
        }
    }

    pub fn profile(&self) -> LinkProfile {
        *self.profile.read()
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Replace the base delay, clamped to `[0, max_delay]`. Returns the applied value.
    pub fn set_base_delay(&self, delay: Duration) -> Duration {
        let clamped = delay.min(self.max_delay);
        self.profile.write().base_delay = clamped;
        debug!("[Link] base delay -> {:?}", clamped);
        clamped
    }

    pub fn set_jitter(&self, jitter_std_dev: Duration) {
        self.profile.write().jitter_std_dev = jitter_std_dev;
    }

    pub fn increase_delay(&self, step: Duration) -> Duration {
        let current = self.profile().base_delay;
        self.set_base_delay(current.saturating_add(step))
    }

    pub fn decrease_delay(&self, step: Duration) -> Duration {
        let current = self.profile().base_delay;
        self.set_base_delay(current.saturating_sub(step))
    }

    #[inline]
    pub fn send_command(&self, msg: CommandMessage) {
        self.send_command_at(msg, Instant::now());
    }

    pub fn send_command_at(&self, msg: CommandMessage, now: Instant) {
        let delay = self.profile().sample_delay();
        self.m2s.send_at(msg, delay, now);
    }

    #[inline]
    pub fn send_feedback(&self, msg: FeedbackMessage) {
        self.send_feedback_at(msg, Instant::now());
    }

    pub fn send_feedback_at(&self, msg: FeedbackMessage, now: Instant) {
        let delay = self.profile().sample_delay();
        self.s2m.send_at(msg, delay, now);
    }

    #[inline]
    pub fn try_receive_command(&self) -> Option<CommandMessage> {
        self.m2s.try_receive()
    }

    pub fn try_receive_command_at(&self, now: Instant) -> Option<CommandMessage> {
        self.m2s.try_receive_at(now)
    }

    #[inline]
    pub fn try_receive_feedback(&self) -> Option<FeedbackMessage> {
        self.s2m.try_receive()
    }

    pub fn try_receive_feedback_at(&self, now: Instant) -> Option<FeedbackMessage> {
        self.s2m.try_receive_at(now)
    }

    /// Flush both directions (trial or spring switch).
    pub fn clear_channels(&self) {
        self.m2s.clear();
        self.s2m.clear();
    }

    pub fn commands(&self) -> &DelayChannel<CommandMessage> {
        &self.m2s
    }

    pub fn feedback(&self) -> &DelayChannel<FeedbackMessage> {
        &self.s2m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vector3;

    fn command(seq: i64) -> CommandMessage {
        CommandMessage {
            sequence_number: seq,
            spring: 0,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
        }
    }

    #[test]
    fn delay_is_clamped_to_max() {
        let link = Link::new(LinkProfile::default(), Duration::from_millis(200));
        for _ in 0..300 {
            link.increase_delay(Duration::from_millis(1));
        }
        assert_eq!(link.profile().base_delay, Duration::from_millis(200));

        let applied = link.decrease_delay(Duration::from_millis(500));
        assert_eq!(applied, Duration::ZERO);
    }

    #[test]
    fn configured_max_never_exceeds_hard_limit() {
        let link = Link::new(LinkProfile::default(), Duration::from_secs(5));
        assert_eq!(link.max_delay(), MAX_LINK_DELAY);
    }

    #[test]
    fn jitter_free_profile_is_deterministic() {
        let p = LinkProfile {
            base_delay: Duration::from_millis(4),
            jitter_std_dev: Duration::ZERO,
        };
        for _ in 0..10 {
            assert_eq!(p.sample_delay(), Duration::from_millis(4));
        }
    }

    #[test]
    fn jitter_spreads_delays_around_the_base() {
        let p = LinkProfile {
            base_delay: Duration::from_millis(20),
            jitter_std_dev: Duration::from_millis(5),
        };
        let samples: Vec<f64> = (0..5_000)
            .map(|_| p.sample_delay().as_secs_f64() * 1e3)
            .collect();

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0);
        assert!((mean - 20.0).abs() < 0.5, "mean {mean}");
        assert!((var.sqrt() - 5.0).abs() < 0.5, "std dev {}", var.sqrt());
    }

    #[test]
    fn jitter_below_zero_delivers_immediately() {
        let p = LinkProfile {
            base_delay: Duration::ZERO,
            jitter_std_dev: Duration::from_millis(5),
        };
        let zeros = (0..1_000)
            .filter(|_| p.sample_delay() == Duration::ZERO)
            .count();
        // half the Normal mass sits below zero
        assert!((400..600).contains(&zeros), "zeros {zeros}");
    }

    #[test]
    fn directions_are_independent() {
        let link = Link::new(LinkProfile::default(), MAX_LINK_DELAY);
        let t0 = Instant::now();
        link.send_command_at(command(1), t0);

        assert!(link.try_receive_feedback_at(t0).is_none());
        assert_eq!(link.try_receive_command_at(t0).map(|c| c.sequence_number), Some(1));
    }

    #[test]
    fn clear_flushes_both_directions() {
        let link = Link::new(
            LinkProfile {
                base_delay: Duration::from_millis(50),
                jitter_std_dev: Duration::ZERO,
            },
            MAX_LINK_DELAY,
        );
        let t0 = Instant::now();
        link.send_command_at(command(1), t0);
        link.send_feedback_at(FeedbackMessage::new(1, Vector3::zeros()), t0);
        link.clear_channels();

        assert!(link.commands().is_empty());
        assert!(link.feedback().is_empty());
    }
}
