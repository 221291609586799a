//! Delay-compensating transforms applied at the edges of the link.
//!
//! Each side owns its half of the active transform. Switching algorithm or spring
//! rebuilds both halves from scratch, which is how accumulated state (energy budget,
//! stiffness estimate, adaptive gain, stored waves) gets reset.

pub mod iss;
pub mod mmt;
pub mod passivity;
pub mod wave;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    Vector3,
    error::ConfigError,
    network::message::{CommandMessage, FeedbackMessage},
    slave::contact::ContactModel,
};
use iss::IssLimiter;
use mmt::{LocalModel, StiffnessEstimator};
use passivity::PassivityController;
use wave::{WaveImpedance, WaveMaster, WaveSlave};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    None,
    Wave,
    Iss,
    Passivity,
    ModelMediated,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::None,
        Algorithm::Wave,
        Algorithm::Iss,
        Algorithm::Passivity,
        Algorithm::ModelMediated,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Algorithm::None => "None",
            Algorithm::Wave => "Wave Variables",
            Algorithm::Iss => "ISS",
            Algorithm::Passivity => "Passivity Control",
            Algorithm::ModelMediated => "MMT",
        }
    }

    /// Next algorithm in cycling order, wrapping around.
    pub fn next(self) -> Algorithm {
        let idx = Self::ALL.iter().position(|a| *a == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tuning constants for every transform; the `[algorithms]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmParams {
    pub wave_b: f64,
    pub iss_tau: f64,
    pub iss_mu_max_scale: f64,
    pub max_stiffness: f64,
    pub mmt_lambda: f64,
    pub mmt_initial_k: f64,
}

impl Default for AlgorithmParams {
    fn default() -> Self {
        Self {
            wave_b: 3.0,
            iss_tau: 0.03,
            iss_mu_max_scale: 1.7,
            max_stiffness: 300.0,
            mmt_lambda: 0.5,
            mmt_initial_k: 0.0,
        }
    }
}

impl AlgorithmParams {
    pub fn impedance(&self) -> Result<WaveImpedance, ConfigError> {
        WaveImpedance::new(self.wave_b).ok_or_else(|| {
            ConfigError::Invalid(format!("wave_b must be > 0, got {}", self.wave_b))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.impedance()?;
        if self.iss_tau < 0.0 || self.iss_mu_max_scale <= 0.0 {
            return Err(ConfigError::Invalid(
                "iss_tau must be >= 0 and iss_mu_max_scale > 0".into(),
            ));
        }
        if self.max_stiffness < 0.0 || self.mmt_lambda < 0.0 {
            return Err(ConfigError::Invalid(
                "max_stiffness and mmt_lambda must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

/// What the slave puts on the wire after encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackPayload {
    pub force: Vector3,
    pub stiffness: Option<f64>,
    pub force_rate: Option<Vector3>,
}

/// Master half of the active transform.
#[derive(Debug, Clone)]
pub enum MasterTransform {
    None,
    Wave(WaveMaster),
    Iss {
        limiter: IssLimiter,
        pending_rate: Vector3,
    },
    Passivity,
    ModelMediated(LocalModel),
}

impl MasterTransform {
    pub fn new(
        algorithm: Algorithm,
        params: &AlgorithmParams,
        spring: &ContactModel,
        dt: f64,
    ) -> Result<Self, ConfigError> {
        Ok(match algorithm {
            Algorithm::None => MasterTransform::None,
            Algorithm::Wave => MasterTransform::Wave(WaveMaster::new(params.impedance()?)),
            Algorithm::Iss => MasterTransform::Iss {
                limiter: IssLimiter::new(
                    params.iss_tau,
                    params.iss_mu_max_scale,
                    params.max_stiffness,
                    dt,
                ),
                pending_rate: Vector3::zeros(),
            },
            Algorithm::Passivity => MasterTransform::Passivity,
            Algorithm::ModelMediated => {
                MasterTransform::ModelMediated(LocalModel::new(params.mmt_initial_k, *spring))
            }
        })
    }

    /// Velocity field of the outgoing command.
    pub fn encode_outgoing(&mut self, _pos: &Vector3, vel: &Vector3) -> Vector3 {
        match self {
            MasterTransform::Wave(w) => w.encode(vel),
            MasterTransform::Iss {
                limiter,
                pending_rate,
            } => {
                // each received force rate corrects one outgoing sample
                let corrected = limiter.corrected_velocity(vel, pending_rate);
                *pending_rate = Vector3::zeros();
                corrected
            }
            _ => *vel,
        }
    }

    /// Force to display for a freshly received feedback message.
    pub fn decode_incoming(
        &mut self,
        msg: &FeedbackMessage,
        pos: &Vector3,
        vel: &Vector3,
    ) -> Vector3 {
        match self {
            MasterTransform::None | MasterTransform::Passivity => msg.force,
            MasterTransform::Wave(w) => w.decode(&msg.force, vel),
            MasterTransform::Iss {
                limiter,
                pending_rate,
            } => {
                // packets from before a switch to ISS carry no rate
                if let Some(rate) = msg.force_rate {
                    let measured = limiter.measured_force(&msg.force, &rate);
                    limiter.observe_force(&measured, pos);
                    *pending_rate = rate;
                }
                msg.force
            }
            MasterTransform::ModelMediated(model) => {
                if let Some(k) = msg.stiffness {
                    model.set_k_hat(k);
                }
                model.force(pos)
            }
        }
    }

    /// Force to display on ticks with no feedback. `None` holds the last output.
    pub fn hold_force(&self, pos: &Vector3) -> Option<Vector3> {
        match self {
            MasterTransform::ModelMediated(model) => Some(model.force(pos)),
            _ => None,
        }
    }
}

/// Slave half of the active transform.
#[derive(Debug, Clone)]
pub enum SlaveTransform {
    None,
    Wave(WaveSlave),
    Iss(IssLimiter),
    Passivity(PassivityController),
    ModelMediated(StiffnessEstimator),
}

impl SlaveTransform {
    pub fn new(
        algorithm: Algorithm,
        params: &AlgorithmParams,
        spring: &ContactModel,
        dt: f64,
    ) -> Result<Self, ConfigError> {
        Ok(match algorithm {
            Algorithm::None => SlaveTransform::None,
            Algorithm::Wave => SlaveTransform::Wave(WaveSlave::new(params.impedance()?)),
            Algorithm::Iss => SlaveTransform::Iss(IssLimiter::new(
                params.iss_tau,
                params.iss_mu_max_scale,
                params.max_stiffness,
                dt,
            )),
            Algorithm::Passivity => SlaveTransform::Passivity(PassivityController::new()),
            Algorithm::ModelMediated => SlaveTransform::ModelMediated(StiffnessEstimator::new(
                params.mmt_initial_k,
                params.mmt_lambda,
                *spring,
            )),
        })
    }

    /// Velocity reference carried by a freshly received command.
    pub fn decode_incoming(&mut self, msg: &CommandMessage, contact_force: &Vector3) -> Vector3 {
        match self {
            SlaveTransform::Wave(w) => w.decode(&msg.velocity, contact_force),
            _ => msg.velocity,
        }
    }

    pub fn encode_outgoing(
        &mut self,
        force: &Vector3,
        pos: &Vector3,
        vel: &Vector3,
    ) -> FeedbackPayload {
        let plain = |force| FeedbackPayload {
            force,
            stiffness: None,
            force_rate: None,
        };
        match self {
            SlaveTransform::None => plain(*force),
            SlaveTransform::Wave(w) => plain(w.encode(force)),
            SlaveTransform::Iss(limiter) => {
                let (led, rate) = limiter.encode_force(force, pos);
                FeedbackPayload {
                    force_rate: Some(rate),
                    ..plain(led)
                }
            }
            SlaveTransform::Passivity(pc) => plain(pc.apply(force, vel)),
            SlaveTransform::ModelMediated(est) => FeedbackPayload {
                stiffness: Some(est.update(force, pos)),
                ..plain(*force)
            },
        }
    }
}
