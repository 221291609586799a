//! wave.rs
//! Wave-variable (scattering) transform.
//!
//! Velocity and force are never sent directly; each side sends a wave variable
//! mixing both with characteristic impedance `b`. The communicated energy stays
//! passive for any constant delay, at the cost of an added damping of `b`.
//!
//! Master: `u_m = sqrt(2b) * vel - v_m`, force `F = b * vel - sqrt(2b) * v_m`
//! Slave:  `vel_ref = sqrt(2/b) * u_s - F / b`, reply `v_s = u_s - sqrt(2/b) * F`

use crate::Vector3;

/// Characteristic impedance, shared by both sides of the link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveImpedance {
    b: f64,
}

impl WaveImpedance {
    /// Returns `None` unless `b` is strictly positive.
    pub fn new(b: f64) -> Option<Self> {
        (b > 0.0 && b.is_finite()).then_some(Self { b })
    }

    #[inline]
    pub fn b(&self) -> f64 {
        self.b
    }

    #[inline]
    fn sqrt_2b(&self) -> f64 {
        (2.0 * self.b).sqrt()
    }

    #[inline]
    fn sqrt_2_over_b(&self) -> f64 {
        (2.0 / self.b).sqrt()
    }
}

/// Master leg: remembers the last wave variable received from the slave.
#[derive(Debug, Clone)]
pub struct WaveMaster {
    z: WaveImpedance,
    v_m: Vector3,
}

impl WaveMaster {
    pub fn new(z: WaveImpedance) -> Self {
        Self {
            z,
            v_m: Vector3::zeros(),
        }
    }

    /// Outgoing wave `u_m` for the current master velocity.
    pub fn encode(&self, vel: &Vector3) -> Vector3 {
        self.z.sqrt_2b() * vel - self.v_m
    }

    /// Absorb the slave's wave `v_m` and recover the force to display.
    pub fn decode(&mut self, v_m: &Vector3, vel: &Vector3) -> Vector3 {
        self.v_m = *v_m;
        self.z.b() * vel - self.z.sqrt_2b() * self.v_m
    }
}

/// Slave leg: remembers the last wave variable received from the master.
#[derive(Debug, Clone)]
pub struct WaveSlave {
    z: WaveImpedance,
    u_s: Vector3,
}

impl WaveSlave {
    pub fn new(z: WaveImpedance) -> Self {
        Self {
            z,
            u_s: Vector3::zeros(),
        }
    }

    /// Absorb the master's wave `u_s` and recover the velocity reference.
    pub fn decode(&mut self, u_s: &Vector3, force: &Vector3) -> Vector3 {
        self.u_s = *u_s;
        self.z.sqrt_2_over_b() * self.u_s - force / self.z.b()
    }

    /// Returning wave `v_s` for the current slave force.
    pub fn encode(&self, force: &Vector3) -> Vector3 {
        self.u_s - self.z.sqrt_2_over_b() * force
    }
}
