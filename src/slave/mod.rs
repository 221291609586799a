//! Slave node: simulated tool mass tracking the master's reference against a
//! compliant environment.

pub mod contact;
pub mod slave_loop;
pub mod tracker;

use crate::{
    Vector3,
    network::message::constrain,
    slave::tracker::{TrackerConfig, TrajectoryTracker},
};

/// Mass-damper tool driven by the tracker plus the environment.
///
/// Semi-implicit Euler per tick: `vel += F/m * dt; vel *= 1 - damping; pos += vel * dt`.
#[derive(Debug, Clone)]
pub struct SlaveModel {
    mass: f64,
    damping: f64,
    position: Vector3,
    velocity: Vector3,
    tracker: TrajectoryTracker,
}

impl SlaveModel {
    pub fn new(mass: f64, damping: f64, tracker: TrackerConfig) -> Self {
        Self {
            mass,
            damping,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            tracker: tracker.into(),
        }
    }

    pub fn with_state(mut self, position: Vector3, velocity: Vector3) -> Self {
        self.position = constrain(position);
        self.velocity = constrain(velocity);
        self
    }

    #[inline]
    pub fn position(&self) -> Vector3 {
        self.position
    }

    #[inline]
    pub fn velocity(&self) -> Vector3 {
        self.velocity
    }

    /// Advance one tick toward the reference. Returns the tracking force applied.
    pub fn step(
        &mut self,
        pos_ref: &Vector3,
        vel_ref: &Vector3,
        contact_force: &Vector3,
        dt: f64,
    ) -> Vector3 {
        let tracking = self
            .tracker
            .force(pos_ref, &self.position, vel_ref, &self.velocity, dt);
        let total = constrain(tracking + contact_force);

        self.velocity += total / self.mass * dt;
        self.velocity *= 1.0 - self.damping;
        self.position += self.velocity * dt;
        tracking
    }

    pub fn reset_tracker(&mut self) {
        self.tracker.reset();
    }
}
