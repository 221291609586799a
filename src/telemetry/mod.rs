//! Visualisation surface.
//!
//! Loops publish one frame per tick into a lock-free bounded queue and never wait;
//! when the renderer falls behind, frames are dropped and counted. The renderer drains
//! the queue into capped ring buffers and draws from those.

pub mod dashboard;

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
};

use crossbeam_queue::ArrayQueue;

use crate::{network::message::Node, stability::Algorithm};

pub const BOARD_CAPACITY: usize = 8_192;
pub const MAX_POINTS: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    pub node: Node,
    pub position: f64,
    pub force: f64,
    pub indentation: f64,
    pub algorithm: Algorithm,
    pub packet_rate_hz: f64,
    pub delay_ms: f64,
}

/// Push-only sink for per-tick readouts.
pub trait VisualizationSurface: Send + Sync {
    fn publish(&self, frame: TelemetryFrame);
}

/// Headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl VisualizationSurface for NullSurface {
    fn publish(&self, _frame: TelemetryFrame) {}
}

pub struct TelemetryBoard {
    queue: ArrayQueue<TelemetryFrame>,
    dropped: AtomicU64,
}

impl Default for TelemetryBoard {
    fn default() -> Self {
        Self::with_capacity(BOARD_CAPACITY)
    }
}

impl TelemetryBoard {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn pop(&self) -> Option<TelemetryFrame> {
        self.queue.pop()
    }
}

impl VisualizationSurface for TelemetryBoard {
    #[inline]
    fn publish(&self, frame: TelemetryFrame) {
        if self.queue.push(frame).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Appends value to a trace buffer; removes oldest if at capacity.
#[inline]
pub fn push_capped(buf: &mut VecDeque<f64>, val: f64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Renderer-side trace history.
#[derive(Debug, Default, Clone)]
pub struct TelemetryHistory {
    pub master_position: VecDeque<f64>,
    pub master_force: VecDeque<f64>,
    pub slave_position: VecDeque<f64>,
    pub slave_force: VecDeque<f64>,
    pub indentation: VecDeque<f64>,
    /// Most recent readouts, for the status line.
    pub latest: Option<TelemetryFrame>,
}

impl TelemetryHistory {
    /// Move every queued frame into the trace buffers. Returns how many were taken.
    pub fn drain(&mut self, board: &TelemetryBoard) -> usize {
        let mut taken = 0;
        while let Some(frame) = board.pop() {
            match frame.node {
                Node::Master => {
                    push_capped(&mut self.master_position, frame.position);
                    push_capped(&mut self.master_force, frame.force);
                }
                Node::Slave => {
                    push_capped(&mut self.slave_position, frame.position);
                    push_capped(&mut self.slave_force, frame.force);
                    push_capped(&mut self.indentation, frame.indentation);
                }
            }
            self.latest = Some(frame);
            taken += 1;
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(node: Node, position: f64) -> TelemetryFrame {
        TelemetryFrame {
            node,
            position,
            force: -position,
            indentation: position.max(0.0),
            algorithm: Algorithm::None,
            packet_rate_hz: 100.0,
            delay_ms: 10.0,
        }
    }

    #[test]
    fn full_board_drops_and_counts() {
        let board = TelemetryBoard::with_capacity(4);
        for i in 0..10 {
            board.publish(frame(Node::Slave, i as f64));
        }
        assert_eq!(board.dropped(), 6);

        let mut history = TelemetryHistory::default();
        assert_eq!(history.drain(&board), 4);
        assert_eq!(history.slave_position, VecDeque::from(vec![0.0, 1.0, 2.0, 3.0]));
    }

    #[test]
    fn frames_are_routed_by_node() {
        let board = TelemetryBoard::default();
        board.publish(frame(Node::Master, 0.5));
        board.publish(frame(Node::Slave, 0.25));

        let mut history = TelemetryHistory::default();
        history.drain(&board);
        assert_eq!(history.master_position.len(), 1);
        assert_eq!(history.slave_position.len(), 1);
        assert_eq!(history.indentation.back(), Some(&0.25));
        assert_eq!(history.latest.map(|f| f.node), Some(Node::Slave));
    }

    #[test]
    fn trace_buffers_are_capped() {
        let mut buf = VecDeque::new();
        for i in 0..(MAX_POINTS + 50) {
            push_capped(&mut buf, i as f64);
        }
        assert_eq!(buf.len(), MAX_POINTS);
        assert_eq!(buf.front(), Some(&50.0));
    }
}
