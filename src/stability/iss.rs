//! iss.rs
//! Input-to-state stability limiting.
//!
//! The transmitted force is led by its discrete derivative, `F + tau * dF/dt`, and the
//! master's velocity command is pulled back by `(dF/dt) / mu_max`. `mu_max` is an
//! online, never-decreasing estimate of the steepest environment stiffness seen so far.
//!
//! Only the slave samples the force every tick, so only the slave differentiates it.
//! The rate travels with the feedback; packets may be many ticks apart.

use crate::Vector3;

#[derive(Debug, Clone)]
pub struct IssLimiter {
    tau: f64,
    scale: f64,
    mu_max: f64,
    dt: f64,
    prev_force: Vector3,
    prev_pos: Vector3,
}

impl IssLimiter {
    /// `mu_max` starts at `max_stiffness / 3 * scale`.
    pub fn new(tau: f64, scale: f64, max_stiffness: f64, dt: f64) -> Self {
        Self {
            tau,
            scale,
            mu_max: (max_stiffness / 3.0 * scale).max(0.0),
            dt,
            prev_force: Vector3::zeros(),
            prev_pos: Vector3::zeros(),
        }
    }

    #[inline]
    pub fn mu_max(&self) -> f64 {
        self.mu_max
    }

    /// Raise `mu_max` to `scale * |dF| / |dpos|` when that is steeper. Motionless
    /// samples carry no slope information and are ignored.
    pub fn update_mu_max(
        &mut self,
        force: &Vector3,
        prev_force: &Vector3,
        pos: &Vector3,
        prev_pos: &Vector3,
    ) {
        let dpos = (pos - prev_pos).norm();
        if dpos <= f64::EPSILON {
            return;
        }
        let slope = self.scale * (force - prev_force).norm() / dpos;
        if slope.is_finite() && slope > self.mu_max {
            self.mu_max = slope;
        }
    }

    /// Force rate over one tick.
    #[inline]
    pub fn force_rate(&self, force: &Vector3) -> Vector3 {
        (force - self.prev_force) / self.dt
    }

    /// `F + tau * dF/dt` for the given rate.
    #[inline]
    pub fn lead_force(&self, force: &Vector3, rate: &Vector3) -> Vector3 {
        force + self.tau * rate
    }

    /// `vel - (dF/dt) / mu_max`; untouched until a slope estimate exists.
    pub fn corrected_velocity(&self, vel: &Vector3, rate: &Vector3) -> Vector3 {
        if self.mu_max <= 0.0 {
            *vel
        } else {
            vel - rate / self.mu_max
        }
    }

    /// Measured force behind a led one: `F_out - tau * dF/dt`.
    #[inline]
    pub fn measured_force(&self, led: &Vector3, rate: &Vector3) -> Vector3 {
        led - self.tau * rate
    }

    /// Slave side: update the slope estimate from the local sample. Returns the force
    /// to transmit and the per-tick force rate it was led by.
    pub fn encode_force(&mut self, force: &Vector3, pos: &Vector3) -> (Vector3, Vector3) {
        let (prev_force, prev_pos) = (self.prev_force, self.prev_pos);
        self.update_mu_max(force, &prev_force, pos, &prev_pos);

        let rate = self.force_rate(force);
        self.prev_force = *force;
        self.prev_pos = *pos;
        (self.lead_force(force, &rate), rate)
    }

    /// Master side: fold a received measured force, taken against the local position,
    /// into the slope estimate. The slope needs no time base, so packet spacing does
    /// not matter here.
    pub fn observe_force(&mut self, force: &Vector3, pos: &Vector3) {
        let (prev_force, prev_pos) = (self.prev_force, self.prev_pos);
        self.update_mu_max(force, &prev_force, pos, &prev_pos);
        self.prev_force = *force;
        self.prev_pos = *pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const DT: f64 = 0.001;

    fn y(v: f64) -> Vector3 {
        Vector3::new(0.0, v, 0.0)
    }

    #[test]
    fn mu_max_is_seeded_from_max_stiffness() {
        let iss = IssLimiter::new(0.03, 1.7, 300.0, DT);
        assert!((iss.mu_max() - 170.0).abs() < 1e-9);
    }

    #[test]
    fn mu_max_never_decreases() {
        let mut iss = IssLimiter::new(0.03, 1.7, 0.0, DT);
        let mut rng = rand::rng();
        let mut last = iss.mu_max();

        for _ in 0..5_000 {
            let f = y(rng.random_range(-5.0..5.0));
            let pf = y(rng.random_range(-5.0..5.0));
            let p = y(rng.random_range(-0.1..0.1));
            let pp = y(rng.random_range(-0.1..0.1));
            iss.update_mu_max(&f, &pf, &p, &pp);
            assert!(iss.mu_max() >= last);
            last = iss.mu_max();
        }
    }

    #[test]
    fn zero_displacement_is_ignored() {
        let mut iss = IssLimiter::new(0.03, 1.0, 30.0, DT);
        iss.update_mu_max(&y(100.0), &y(0.0), &y(0.1), &y(0.1));
        assert!((iss.mu_max() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn slope_estimate_tracks_environment_stiffness() {
        let mut iss = IssLimiter::new(0.03, 1.0, 0.0, DT);
        // linear spring k = 400 sampled along a ramp
        for i in 0..100 {
            let pos = y(i as f64 * 1e-4);
            let force = y(-400.0 * i as f64 * 1e-4);
            iss.encode_force(&force, &pos);
        }
        assert!((iss.mu_max() - 400.0).abs() < 1e-6);
    }

    #[test]
    fn transmitted_force_leads_its_derivative() {
        let mut iss = IssLimiter::new(0.03, 1.7, 300.0, DT);
        iss.encode_force(&y(1.0), &y(0.0));
        let (out, rate) = iss.encode_force(&y(1.1), &y(0.001));
        // 1.1 + 0.03 * (0.1 / 0.001)
        assert!((out.y - 4.1).abs() < 1e-9);
        assert!((rate.y - 100.0).abs() < 1e-9);
        assert!((iss.measured_force(&out, &rate).y - 1.1).abs() < 1e-9);
    }

    #[test]
    fn velocity_correction_scales_with_inverse_gain() {
        let iss = IssLimiter::new(0.03, 1.0, 300.0, DT);
        let v = iss.corrected_velocity(&y(0.5), &y(100.0));
        assert!((v.y - (0.5 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn no_velocity_correction_without_estimate() {
        let iss = IssLimiter::new(0.03, 1.0, 0.0, DT);
        assert_eq!(iss.corrected_velocity(&y(0.5), &y(100.0)), y(0.5));
    }
}
