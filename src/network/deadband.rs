//! Perceptual deadband: a sample is only worth sending once it differs from the
//! last transmitted one by more than a threshold.
//!
//! Velocity uses a relative (Weber) threshold. Position uses an absolute one: the
//! slave holds the last received position, so the drift it is allowed to fall behind
//! must be bounded in metres, whatever the velocity does.

use crate::Vector3;

#[derive(Debug, Clone)]
pub struct DeadbandDetector {
    threshold: f64,
    previous: Vector3,
}

impl DeadbandDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.max(0.0),
            previous: Vector3::zeros(),
        }
    }

    /// True when `value` differs perceptibly from the last accepted sample.
    pub fn exceeds(&self, value: &Vector3) -> bool {
        let diff = (value - self.previous).norm();
        let reference = self.previous.norm();

        if reference == 0.0 {
            diff > 0.0
        } else {
            diff / reference > self.threshold
        }
    }

    /// Make `value` the new reference.
    #[inline]
    pub fn accept(&mut self, value: &Vector3) {
        self.previous = *value;
    }

    /// True when `value` is perceptually identical to the last accepted sample.
    /// Otherwise `value` is accepted as the new reference.
    pub fn in_deadband(&mut self, value: &Vector3) -> bool {
        let changed = self.exceeds(value);
        if changed {
            self.accept(value);
        }
        !changed
    }

    pub fn reset(&mut self) {
        self.previous = Vector3::zeros();
    }
}

/// Deadband over a whole master command.
#[derive(Debug, Clone)]
pub struct CommandDeadband {
    velocity: DeadbandDetector,
    position_threshold: f64,
    last_position: Option<Vector3>,
}

impl CommandDeadband {
    pub fn new(velocity_threshold: f64, position_threshold: f64) -> Self {
        Self {
            velocity: DeadbandDetector::new(velocity_threshold),
            position_threshold: position_threshold.max(0.0),
            last_position: None,
        }
    }

    /// True when either field moved out of its deadband since the last commit.
    pub fn changed(&self, position: &Vector3, velocity: &Vector3) -> bool {
        let moved = self
            .last_position
            .is_none_or(|last| (position - last).norm() > self.position_threshold);
        moved || self.velocity.exceeds(velocity)
    }

    /// Record a command that actually went out.
    pub fn commit(&mut self, position: &Vector3, velocity: &Vector3) {
        self.last_position = Some(*position);
        self.velocity.accept(velocity);
    }

    pub fn reset(&mut self) {
        self.velocity.reset();
        self.last_position = None;
    }
}
