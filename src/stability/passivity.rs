//! passivity.rs
//! Time-domain passivity observer / controller.
//!
//! Energy budget: `E += F . v + alpha * |v_prev|^2` per tick. While `E < 0` a variable
//! damper `alpha = -E / |v|^2` is switched in and `alpha * v` is added to the outgoing
//! force; otherwise `alpha = 0` and the force passes through.

use crate::Vector3;

#[derive(Debug, Clone, Default)]
pub struct PassivityController {
    alpha: f64,
    energy: f64,
    prev_vel: Vector3,
}

impl PassivityController {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn energy(&self) -> f64 {
        self.energy
    }

    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn apply(&mut self, force: &Vector3, vel: &Vector3) -> Vector3 {
        self.energy += force.dot(vel) + self.alpha * self.prev_vel.dot(&self.prev_vel);
        self.prev_vel = *vel;

        let speed_sq = vel.dot(vel);
        self.alpha = if self.energy < 0.0 && speed_sq > 0.0 {
            -self.energy / speed_sq
        } else {
            0.0
        };

        force + self.alpha * vel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn y(v: f64) -> Vector3 {
        Vector3::new(0.0, v, 0.0)
    }

    #[test]
    fn positive_budget_passes_force_through() {
        let mut pc = PassivityController::new();
        let out = pc.apply(&y(2.0), &y(0.5));
        assert_eq!(out, y(2.0));
        assert_eq!(pc.alpha(), 0.0);
        assert!((pc.energy() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn negative_budget_switches_damping_in() {
        let mut pc = PassivityController::new();
        // E = -2 * 0.5 = -1, alpha = 1 / 0.25 = 4
        let out = pc.apply(&y(-2.0), &y(0.5));
        assert!((pc.alpha() - 4.0).abs() < 1e-12);
        assert!((out.y - (-2.0 + 4.0 * 0.5)).abs() < 1e-12);
    }

    #[test]
    fn dissipated_energy_is_credited_next_tick() {
        let mut pc = PassivityController::new();
        pc.apply(&y(-2.0), &y(0.5));
        // E = -1 + 0 + alpha(4) * 0.25 = 0 -> no damping
        let out = pc.apply(&y(0.0), &y(0.5));
        assert!(pc.energy().abs() < 1e-12);
        assert_eq!(pc.alpha(), 0.0);
        assert_eq!(out, y(0.0));
    }

    #[test]
    fn standstill_never_divides_by_zero() {
        let mut pc = PassivityController::new();
        let out = pc.apply(&y(-3.0), &Vector3::zeros());
        assert_eq!(pc.alpha(), 0.0);
        assert_eq!(out, y(-3.0));
        assert!(out.y.is_finite());
    }
}
