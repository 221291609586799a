//! mmt.rs
//! Model-mediated teleoperation.
//!
//! The slave fits a linear stiffness `k_hat` to what it measures,
//! `k_hat += lambda * (-k_hat * d - F)`, and ships only that scalar. The master
//! renders `F = -k_hat * d_master` from its own indentation every tick, so the
//! force it displays no longer depends on how often packets arrive.

use crate::{
    Vector3,
    network::message::{CONSTRAINED_AXIS, along_axis},
    slave::contact::ContactModel,
};

/// Slave-side estimator.
#[derive(Debug, Clone)]
pub struct StiffnessEstimator {
    k_hat: f64,
    lambda: f64,
    wall: ContactModel,
}

impl StiffnessEstimator {
    pub fn new(initial_k: f64, lambda: f64, wall: ContactModel) -> Self {
        Self {
            k_hat: initial_k,
            lambda,
            wall,
        }
    }

    #[inline]
    pub fn k_hat(&self) -> f64 {
        self.k_hat
    }

    /// One gradient step against the measured contact force.
    pub fn update(&mut self, measured: &Vector3, pos: &Vector3) -> f64 {
        let d = self.wall.indentation(pos);
        let estimated = -self.k_hat * d;
        self.k_hat += self.lambda * (estimated - measured[CONSTRAINED_AXIS]);
        self.k_hat
    }
}

/// Master-side local model.
#[derive(Debug, Clone)]
pub struct LocalModel {
    k_hat: f64,
    wall: ContactModel,
}

impl LocalModel {
    pub fn new(initial_k: f64, wall: ContactModel) -> Self {
        Self {
            k_hat: initial_k,
            wall,
        }
    }

    #[inline]
    pub fn k_hat(&self) -> f64 {
        self.k_hat
    }

    pub fn set_k_hat(&mut self, k: f64) {
        if k.is_finite() {
            self.k_hat = k;
        }
    }

    pub fn force(&self, pos: &Vector3) -> Vector3 {
        along_axis(-self.k_hat * self.wall.indentation(pos))
    }
}
