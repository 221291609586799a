//! tracker.rs
//! Local trajectory tracking on the slave: drives the simulated mass toward the
//! (possibly stale) reference it last received from the master.
//!
//! PD: `kP * (pos_ref - pos) + kD * (vel_ref - vel)`
//! PID: `kP * e + kI * integral(e) + kD * de/dt` on the position error only.
//! The variant is a static configuration choice; it is never switched at runtime.

use serde::{Deserialize, Serialize};

use crate::Vector3;

/// Tracker gains as they appear in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TrackerConfig {
    Pd { kp: f64, kd: f64 },
    Pid { kp: f64, ki: f64, kd: f64 },
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig::Pd { kp: 300.0, kd: 1.5 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PidState {
    integral: Vector3,
    prev_error: Vector3,
}

#[derive(Debug, Clone)]
pub enum TrajectoryTracker {
    Pd { kp: f64, kd: f64 },
    Pid { kp: f64, ki: f64, kd: f64, state: PidState },
}

impl From<TrackerConfig> for TrajectoryTracker {
    fn from(cfg: TrackerConfig) -> Self {
        match cfg {
            TrackerConfig::Pd { kp, kd } => TrajectoryTracker::Pd { kp, kd },
            TrackerConfig::Pid { kp, ki, kd } => TrajectoryTracker::Pid {
                kp,
                ki,
                kd,
                state: PidState::default(),
            },
        }
    }
}

impl TrajectoryTracker {
    /// Tracking force for one tick of length `dt` seconds.
    pub fn force(
        &mut self,
        pos_ref: &Vector3,
        pos: &Vector3,
        vel_ref: &Vector3,
        vel: &Vector3,
        dt: f64,
    ) -> Vector3 {
        match self {
            TrajectoryTracker::Pd { kp, kd } => *kp * (pos_ref - pos) + *kd * (vel_ref - vel),
            TrajectoryTracker::Pid { kp, ki, kd, state } => {
                let error = pos_ref - pos;
                if dt <= 0.0 {
                    return *kp * error;
                }
                state.integral += error * dt;
                let derivative = (error - state.prev_error) / dt;
                state.prev_error = error;
                *kp * error + *ki * state.integral + *kd * derivative
            }
        }
    }

    /// Forget integral and derivative history.
    pub fn reset(&mut self) {
        if let TrajectoryTracker::Pid { state, .. } = self {
            *state = PidState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.001;

    fn y(v: f64) -> Vector3 {
        Vector3::new(0.0, v, 0.0)
    }

    #[test]
    fn pd_is_spring_plus_damper() {
        let mut t = TrajectoryTracker::from(TrackerConfig::Pd { kp: 300.0, kd: 1.5 });
        let f = t.force(&y(0.01), &y(0.0), &y(0.2), &y(0.1), DT);
        assert!((f.y - (300.0 * 0.01 + 1.5 * 0.1)).abs() < 1e-12);
    }

    #[test]
    fn pd_at_reference_is_zero() {
        let mut t = TrajectoryTracker::from(TrackerConfig::default());
        let f = t.force(&y(0.3), &y(0.3), &y(1.0), &y(1.0), DT);
        assert_eq!(f, Vector3::zeros());
    }

    #[test]
    fn pid_integral_accumulates_constant_error() {
        let mut t = TrajectoryTracker::from(TrackerConfig::Pid { kp: 0.0, ki: 100.0, kd: 0.0 });
        let mut out = Vector3::zeros();
        for _ in 0..10 {
            out = t.force(&y(1.0), &y(0.0), &Vector3::zeros(), &Vector3::zeros(), DT);
        }
        // 10 ticks * 1ms * error 1.0 * ki 100
        assert!((out.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pid_derivative_reacts_to_error_change() {
        let mut t = TrajectoryTracker::from(TrackerConfig::Pid { kp: 0.0, ki: 0.0, kd: 2.0 });
        let z = Vector3::zeros();
        t.force(&y(0.0), &y(0.0), &z, &z, DT);
        let f = t.force(&y(0.001), &y(0.0), &z, &z, DT);
        assert!((f.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_pid_history() {
        let mut t = TrajectoryTracker::from(TrackerConfig::Pid { kp: 0.0, ki: 1.0, kd: 0.0 });
        let z = Vector3::zeros();
        for _ in 0..100 {
            t.force(&y(1.0), &y(0.0), &z, &z, DT);
        }
        t.reset();
        let f = t.force(&y(1.0), &y(0.0), &z, &z, DT);
        assert!((f.y - 0.001).abs() < 1e-12);
    }
}
