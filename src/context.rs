//! Application context shared by both control loops and the operator thread.
//!
//! Built once at startup and handed out behind an `Arc`; there are no process globals.
//! The only cross-thread mutable state is the `SharedConfig`, the link (profile and
//! channels) and the running flag.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, info};
use parking_lot::Mutex;

use crate::{
    config::TeleopConfig,
    network::link::Link,
    slave::contact::ContactModel,
    stability::Algorithm,
};

/// Runtime settings read by both loops every tick, written by the experiment controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharedState {
    pub algorithm: Algorithm,
    pub spring_index: usize,
    pub reference_mode: bool,
    pub force_feedback: bool,
    pub master_rate_hz: f64,
    pub slave_rate_hz: f64,
}

impl SharedState {
    pub fn from_config(cfg: &TeleopConfig) -> Self {
        Self {
            algorithm: cfg.master.initial_algorithm,
            spring_index: cfg.master.initial_spring,
            reference_mode: false,
            force_feedback: cfg.master.force_feedback,
            master_rate_hz: cfg.rate.initial_hz,
            slave_rate_hz: cfg.rate.initial_hz,
        }
    }
}

/// Single mutex around [`SharedState`]. Readers copy the state out and release the
/// lock before doing any I/O.
#[derive(Debug)]
pub struct SharedConfig {
    inner: Mutex<SharedState>,
}

impl SharedConfig {
    pub fn new(state: SharedState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> SharedState {
        *self.inner.lock()
    }

    /// Apply `f` under the lock and return the resulting state.
    pub fn update<F>(&self, f: F) -> SharedState
    where
        F: FnOnce(&mut SharedState),
    {
        let mut guard = self.inner.lock();
        f(&mut guard);
        *guard
    }
}

pub struct AppContext {
    pub config: TeleopConfig,
    pub shared: SharedConfig,
    pub link: Link,
    running: AtomicBool,
}

impl AppContext {
    pub fn new(config: TeleopConfig) -> Arc<Self> {
        let shared = SharedConfig::new(SharedState::from_config(&config));
        let link = Link::new(config.link.profile(), config.link.max_delay());
        Arc::new(Self {
            config,
            shared,
            link,
            running: AtomicBool::new(true),
        })
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("stop requested");
        }
    }

    pub fn spring_count(&self) -> usize {
        self.config.springs.len()
    }

    /// Spring at `index`, falling back to the last configured one.
    pub fn spring(&self, index: usize) -> ContactModel {
        let springs = &self.config.springs;
        springs
            .get(index)
            .or_else(|| springs.last())
            .copied()
            .unwrap_or_default()
    }

    /// Switch the active spring. In-flight packets describe the old spring, so the
    /// link is flushed under the same lock; both loops reset their transform state on
    /// the next tick. A loop still working from an older snapshot may send once more
    /// after the flush; messages carry their spring index and receivers drop those.
    pub fn select_spring(&self, index: usize) -> SharedState {
        let index = index.min(self.spring_count().saturating_sub(1));
        let state = self.shared.update(|s| {
            s.spring_index = index;
            self.link.clear_channels();
        });
        debug!("spring {index} selected, link flushed");
        state
    }

    pub fn select_algorithm(&self, algorithm: Algorithm) -> SharedState {
        let state = self.shared.update(|s| s.algorithm = algorithm);
        debug!("algorithm set to {algorithm}");
        state
    }

    /// Set both packet rates, clamped to the configured bounds.
    pub fn set_packet_rate(&self, hz: f64) -> SharedState {
        let hz = self.config.rate.clamp(hz);
        self.shared.update(|s| {
            s.master_rate_hz = hz;
            s.slave_rate_hz = hz;
        })
    }
}
