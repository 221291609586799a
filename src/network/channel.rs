//! channel.rs
//! Simulated one-way network leg with a per-packet delivery deadline.
//! - send() never blocks and never fails (unbounded queue, no backpressure)
//! - try_receive() never waits; it drains every due packet and hands back only the newest
//! - clear() flushes in-flight packets when the link is reconfigured

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// A payload waiting for its delivery deadline.
#[derive(Debug, Clone)]
pub struct QueuedPacket<T> {
    pub payload: T,
    pub due_at: Instant,
}

/// Single-producer / single-consumer delay line.
///
/// Packets are kept in send order. A delay change only affects packets sent after
/// it, so in-flight packets keep the deadline they were stamped with.
pub struct DelayChannel<T> {
    queue: Mutex<VecDeque<QueuedPacket<T>>>,
    superseded: AtomicU64,
}

impl<T> Default for DelayChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DelayChannel<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            superseded: AtomicU64::new(0),
        }
    }

    /// Queue `msg` for delivery `delay` from now.
    #[inline]
    pub fn send(&self, msg: T, delay: Duration) {
        self.send_at(msg, delay, Instant::now());
    }

    /// Queue `msg` for delivery at `now + delay`.
    pub fn send_at(&self, msg: T, delay: Duration, now: Instant) {
        self.queue.lock().push_back(QueuedPacket {
            payload: msg,
            due_at: now + delay,
        });
    }

    /// Freshest due packet, if any.
    #[inline]
    pub fn try_receive(&self) -> Option<T> {
        self.try_receive_at(Instant::now())
    }

    /// Pops every packet at the front whose deadline is `<= now` and returns the last
    /// one. Older due packets are dropped: a stale force sample is worse than none.
    pub fn try_receive_at(&self, now: Instant) -> Option<T> {
        let mut q = self.queue.lock();
        let mut freshest = None;
        let mut popped: u64 = 0;

        while q.front().is_some_and(|p| p.due_at <= now) {
            freshest = q.pop_front().map(|p| p.payload);
            popped += 1;
        }

        if popped > 1 {
            self.superseded.fetch_add(popped - 1, Ordering::Relaxed);
        }
        freshest
    }

    /// Discard everything in flight.
    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Packets that became due but were overtaken by a fresher one in the same poll.
    pub fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn packet_is_held_until_due() {
        let ch = DelayChannel::new();
        let t0 = Instant::now();
        ch.send_at(7u32, ms(5), t0);

        assert_eq!(ch.try_receive_at(t0 + ms(3)), None);
        assert_eq!(ch.try_receive_at(t0 + ms(6)), Some(7));
        assert!(ch.is_empty());
    }

    #[test]
    fn freshest_due_packet_wins() {
        let ch = DelayChannel::new();
        let t0 = Instant::now();
        ch.send_at(1u32, ms(1), t0);
        ch.send_at(2u32, ms(1), t0);
        ch.send_at(3u32, ms(1), t0);

        assert_eq!(ch.try_receive_at(t0 + ms(2)), Some(3));
        assert_eq!(ch.try_receive_at(t0 + ms(2)), None);
        assert_eq!(ch.superseded(), 2);
    }

    #[test]
    fn not_yet_due_packets_stay_queued() {
        let ch = DelayChannel::new();
        let t0 = Instant::now();
        ch.send_at("early", ms(1), t0);
        ch.send_at("late", ms(10), t0);

        assert_eq!(ch.try_receive_at(t0 + ms(2)), Some("early"));
        assert_eq!(ch.len(), 1);
        assert_eq!(ch.try_receive_at(t0 + ms(11)), Some("late"));
    }

    #[test]
    fn delay_change_keeps_in_flight_deadline() {
        let ch = DelayChannel::new();
        let t0 = Instant::now();
        ch.send_at(1u32, ms(20), t0);
        // operator shortens the link; only the next packet sees it
        ch.send_at(2u32, ms(1), t0 + ms(1));

        // packet 2 is due but queued behind packet 1
        assert_eq!(ch.try_receive_at(t0 + ms(5)), None);
        assert_eq!(ch.try_receive_at(t0 + ms(21)), Some(2));
    }

    #[test]
    fn clear_discards_in_flight() {
        let ch = DelayChannel::new();
        let t0 = Instant::now();
        ch.send_at(1u32, ms(1), t0);
        ch.send_at(2u32, ms(2), t0);
        ch.clear();

        assert!(ch.is_empty());
        assert_eq!(ch.try_receive_at(t0 + ms(10)), None);
    }

    #[test]
    fn zero_delay_is_immediately_due() {
        let ch = DelayChannel::new();
        let t0 = Instant::now();
        ch.send_at(42u8, Duration::ZERO, t0);
        assert_eq!(ch.try_receive_at(t0), Some(42));
    }
}
