//! contact.rs
//! Compliant 1-DOF wall the slave tool presses into.
//!
//! Force law along the constrained axis, for indentation `d = max(0, y - rest)`:
//! `F = -(k * d^1.5 + 0.5 * v * d^1.5)`
//! The damping term vanishes with `d`, so the model is continuous and passive at the
//! contact boundary.

use serde::{Deserialize, Serialize};

use crate::{
    Vector3,
    network::message::{CONSTRAINED_AXIS, along_axis},
};

const DAMPING_FACTOR: f64 = 0.5;

/// Spring geometry and stiffness. Immutable for a given configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactModel {
    pub stiffness: f64,
    pub rest_position: f64,
    #[serde(default = "default_length")]
    pub length: f64,
    #[serde(default = "default_width")]
    pub width: f64,
}

fn default_length() -> f64 {
    0.085
}

fn default_width() -> f64 {
    0.05
}

impl Default for ContactModel {
    fn default() -> Self {
        Self {
            stiffness: 200.0,
            rest_position: -0.085,
            length: default_length(),
            width: default_width(),
        }
    }
}

impl ContactModel {
    pub fn new(stiffness: f64, rest_position: f64) -> Self {
        Self {
            stiffness,
            rest_position,
            ..Self::default()
        }
    }

    /// Penetration depth past the rest position; zero when not in contact.
    #[inline]
    pub fn indentation(&self, position: &Vector3) -> f64 {
        (position[CONSTRAINED_AXIS] - self.rest_position).max(0.0)
    }

    pub fn force_at(&self, position: &Vector3, velocity: &Vector3) -> Vector3 {
        let d = self.indentation(position);
        if d <= 0.0 {
            return Vector3::zeros();
        }

        let d15 = d.powf(1.5);
        let magnitude =
            self.stiffness * d15 + DAMPING_FACTOR * velocity[CONSTRAINED_AXIS] * d15;
        along_axis(-magnitude)
    }

    /// Where the visible surface of the spring sits for a given tool position.
    pub fn surface_position(&self, position: &Vector3) -> f64 {
        self.rest_position + self.indentation(position)
    }
}
