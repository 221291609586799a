//! Wire payloads exchanged between master and slave.
//!
//! Only the axis constrained by the 1-DOF wall (y) carries information; the
//! other axes are zeroed by the sender before a message is built.

use serde::Serialize;

use crate::Vector3;

/// Which end of the link a record or frame comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Master,
    Slave,
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Node::Master => "master",
            Node::Slave => "slave",
        }
    }
}

/// Index of the constrained axis inside a [`Vector3`].
pub const CONSTRAINED_AXIS: usize = 1;

/// Zero every component except the constrained axis.
#[inline]
pub fn constrain(v: Vector3) -> Vector3 {
    Vector3::new(0.0, v[CONSTRAINED_AXIS], 0.0)
}

/// Vector along the constrained axis.
#[inline]
pub fn along_axis(value: f64) -> Vector3 {
    Vector3::new(0.0, value, 0.0)
}

/// Master → slave command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandMessage {
    pub sequence_number: i64,
    /// Spring the sender was configured for; receivers drop packets for any other.
    pub spring: usize,
    pub position: Vector3,
    /// Plain velocity, or the wave variable `u_m` when the wave transform is active.
    pub velocity: Vector3,
}

/// Slave → master feedback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackMessage {
    pub sequence_number: i64,
    pub spring: usize,
    /// Plain force, or the wave variable `v_s` when the wave transform is active.
    pub force: Vector3,
    /// Slave tool position, kept for visualisation sync.
    pub position: Option<Vector3>,
    /// Environment stiffness estimate; only set by model-mediated teleoperation.
    pub stiffness: Option<f64>,
    /// Measured force rate `dF/dt` at the slave; only set by ISS.
    pub force_rate: Option<Vector3>,
}

impl FeedbackMessage {
    /// Plain force feedback for the first spring.
    pub fn new(sequence_number: i64, force: Vector3) -> Self {
        Self {
            sequence_number,
            spring: 0,
            force,
            position: None,
            stiffness: None,
            force_rate: None,
        }
    }

    pub fn for_spring(self, spring: usize) -> Self {
        Self { spring, ..self }
    }
}
