//! device.rs
//! Haptic device boundary for the master node.
//! - `HapticDevice` is the narrow driver interface the master loop talks to
//! - `SimulatedDevice` stands in for hardware: a scripted press-and-release motion
//! - `ScriptedDevice` replays a fixed sample list, one sample per `set_force`

use std::{
    f64::consts::TAU,
    sync::Arc,
    time::Instant,
};

use log::{debug, info};
use parking_lot::Mutex;
use rand_distr::{Distribution, Normal};

use crate::{Vector3, error::DeviceError, network::message::along_axis};

pub trait HapticDevice: Send {
    fn open(&mut self) -> Result<(), DeviceError>;
    fn calibrate(&mut self) -> Result<(), DeviceError>;
    fn position(&mut self) -> Vector3;
    fn linear_velocity(&mut self) -> Vector3;
    fn set_force(&mut self, force: &Vector3);
    fn close(&mut self) -> Result<(), DeviceError>;
}

/// Scale `force` down to `max` newtons, keeping its direction.
pub fn limit_force(force: Vector3, max: f64) -> Vector3 {
    let norm = force.norm();
    if norm > max && norm > 0.0 {
        force * (max.max(0.0) / norm)
    } else {
        force
    }
}

/// Operator motion used by [`SimulatedDevice`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressMotion {
    /// Midpoint of the stroke along the constrained axis.
    pub center: f64,
    pub amplitude: f64,
    pub frequency_hz: f64,
    pub noise_std_dev: f64,
    /// How far the hand yields per newton of displayed force.
    pub hand_compliance: f64,
}

impl PressMotion {
    /// Stroke that dips `depth` past `surface` and lifts the same distance above it.
    pub fn around_surface(surface: f64, depth: f64) -> Self {
        Self {
            center: surface,
            amplitude: depth,
            frequency_hz: 0.5,
            noise_std_dev: 1e-5,
            hand_compliance: 2e-3,
        }
    }
}

pub struct SimulatedDevice {
    motion: PressMotion,
    noise: Option<Normal<f64>>,
    opened_at: Option<Instant>,
    calibrated: bool,
    displayed: Vector3,
}

impl SimulatedDevice {
    pub fn new(motion: PressMotion) -> Self {
        let noise = Normal::new(0.0, motion.noise_std_dev)
            .ok()
            .filter(|_| motion.noise_std_dev > 0.0);
        Self {
            motion,
            noise,
            opened_at: None,
            calibrated: false,
            displayed: Vector3::zeros(),
        }
    }

    fn phase(&self) -> f64 {
        let t = self
            .opened_at
            .map_or(0.0, |t0| t0.elapsed().as_secs_f64());
        TAU * self.motion.frequency_hz * t
    }

    /// Force along the axis pushes the hand back a little.
    fn yield_offset(&self) -> f64 {
        self.displayed.y * self.motion.hand_compliance
    }
}

impl HapticDevice for SimulatedDevice {
    fn open(&mut self) -> Result<(), DeviceError> {
        self.opened_at = Some(Instant::now());
        info!("simulated haptic device opened");
        Ok(())
    }

    fn calibrate(&mut self) -> Result<(), DeviceError> {
        if self.opened_at.is_none() {
            return Err(DeviceError::Calibration("device not open".into()));
        }
        self.calibrated = true;
        debug!("simulated haptic device calibrated");
        Ok(())
    }

    fn position(&mut self) -> Vector3 {
        let m = &self.motion;
        let mut y = m.center + m.amplitude * self.phase().sin() + self.yield_offset();
        if let Some(noise) = &self.noise {
            y += noise.sample(&mut rand::rng());
        }
        along_axis(y)
    }

    fn linear_velocity(&mut self) -> Vector3 {
        let m = &self.motion;
        along_axis(TAU * m.frequency_hz * m.amplitude * self.phase().cos())
    }

    fn set_force(&mut self, force: &Vector3) {
        self.displayed = *force;
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.opened_at.take().is_none() {
            return Err(DeviceError::NotOpen);
        }
        self.calibrated = false;
        info!("simulated haptic device closed");
        Ok(())
    }
}

/// Replays `(position, velocity)` samples. The cursor advances on every
/// `set_force`, i.e. once per master tick, and sticks at the last sample.
pub struct ScriptedDevice {
    samples: Vec<(Vector3, Vector3)>,
    cursor: usize,
    forces: Arc<Mutex<Vec<Vector3>>>,
    open_error: Option<String>,
    calibrate_error: Option<String>,
    open: bool,
}

impl ScriptedDevice {
    pub fn new(samples: Vec<(Vector3, Vector3)>) -> Self {
        Self {
            samples,
            cursor: 0,
            forces: Arc::new(Mutex::new(Vec::new())),
            open_error: None,
            calibrate_error: None,
            open: false,
        }
    }

    pub fn failing_open(mut self, reason: &str) -> Self {
        self.open_error = Some(reason.to_string());
        self
    }

    pub fn failing_calibration(mut self, reason: &str) -> Self {
        self.calibrate_error = Some(reason.to_string());
        self
    }

    /// Every force the master has displayed so far, in tick order.
    pub fn forces(&self) -> Arc<Mutex<Vec<Vector3>>> {
        self.forces.clone()
    }

    fn current(&self) -> (Vector3, Vector3) {
        self.samples
            .get(self.cursor)
            .or_else(|| self.samples.last())
            .copied()
            .unwrap_or_else(|| (Vector3::zeros(), Vector3::zeros()))
    }
}

impl HapticDevice for ScriptedDevice {
    fn open(&mut self) -> Result<(), DeviceError> {
        if let Some(reason) = &self.open_error {
            return Err(DeviceError::Open(reason.clone()));
        }
        self.open = true;
        Ok(())
    }

    fn calibrate(&mut self) -> Result<(), DeviceError> {
        match &self.calibrate_error {
            Some(reason) => Err(DeviceError::Calibration(reason.clone())),
            None if !self.open => Err(DeviceError::NotOpen),
            None => Ok(()),
        }
    }

    fn position(&mut self) -> Vector3 {
        self.current().0
    }

    fn linear_velocity(&mut self) -> Vector3 {
        self.current().1
    }

    fn set_force(&mut self, force: &Vector3) {
        self.forces.lock().push(*force);
        self.cursor += 1;
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen);
        }
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_force_keeps_direction() {
        let f = Vector3::new(3.0, -4.0, 0.0);
        let limited = limit_force(f, 2.5);
        assert!((limited.norm() - 2.5).abs() < 1e-12);
        assert!((limited.normalize() - f.normalize()).norm() < 1e-12);
    }

    #[test]
    fn limit_force_passes_small_forces() {
        let f = Vector3::new(0.0, -1.0, 0.0);
        assert_eq!(limit_force(f, 5.0), f);
        assert_eq!(limit_force(Vector3::zeros(), 0.0), Vector3::zeros());
    }

    #[test]
    fn simulated_device_stays_on_axis_and_in_stroke() {
        let motion = PressMotion::around_surface(-0.085, 0.02);
        let mut dev = SimulatedDevice::new(motion);
        dev.open().unwrap();
        dev.calibrate().unwrap();
        for _ in 0..100 {
            let p = dev.position();
            assert_eq!((p.x, p.z), (0.0, 0.0));
            assert!((p.y - motion.center).abs() < motion.amplitude + 1e-3);
        }
        dev.close().unwrap();
        assert!(matches!(dev.close(), Err(DeviceError::NotOpen)));
    }

    #[test]
    fn calibration_requires_open_device() {
        let mut dev = SimulatedDevice::new(PressMotion::around_surface(0.0, 0.01));
        assert!(matches!(dev.calibrate(), Err(DeviceError::Calibration(_))));
    }

    #[test]
    fn scripted_device_advances_per_force_and_records() {
        let a = (along_axis(0.1), along_axis(1.0));
        let b = (along_axis(0.2), along_axis(2.0));
        let mut dev = ScriptedDevice::new(vec![a, b]);
        let forces = dev.forces();
        dev.open().unwrap();

        assert_eq!(dev.position(), a.0);
        dev.set_force(&along_axis(-1.0));
        assert_eq!(dev.linear_velocity(), b.1);
        dev.set_force(&along_axis(-2.0));
        // holds the last sample once the script runs out
        assert_eq!(dev.position(), b.0);
        assert_eq!(forces.lock().len(), 2);
    }

    #[test]
    fn scripted_failures_surface_as_device_errors() {
        let mut dev = ScriptedDevice::new(Vec::new()).failing_open("no usb");
        assert!(matches!(dev.open(), Err(DeviceError::Open(r)) if r == "no usb"));

        let mut dev = ScriptedDevice::new(Vec::new()).failing_calibration("drift");
        dev.open().unwrap();
        assert!(matches!(dev.calibrate(), Err(DeviceError::Calibration(_))));
    }
}
