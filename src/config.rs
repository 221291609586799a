//! TOML configuration loader with validation.
//!
//! Every section is `#[serde(default)]`, so a partial file (or none at all) yields a
//! runnable testbed. Physical constants live here rather than in code.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    network::{
        link::{LinkProfile, MAX_LINK_DELAY},
        rate_delay::RateDelay,
    },
    slave::{contact::ContactModel, tracker::TrackerConfig},
    stability::{Algorithm, AlgorithmParams},
};

/// Milliseconds as configured to a `Duration`; negative or non-finite input maps to zero.
pub fn millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_micros((ms * 1_000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleopConfig {
    /// Overrides `RUST_LOG` when set.
    pub log_level: Option<String>,
    /// Device force limit, Newtons.
    pub max_force: f64,
    pub timing: TimingConfig,
    pub link: LinkConfig,
    pub rate: RateConfig,
    pub master: MasterConfig,
    pub slave: SlaveConfig,
    pub algorithms: AlgorithmParams,
    pub springs: Vec<ContactModel>,
    pub session: SessionConfig,
    pub rate_delay: RateDelayConfig,
    pub experiment: ExperimentConfig,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            max_force: 5.0,
            timing: TimingConfig::default(),
            link: LinkConfig::default(),
            rate: RateConfig::default(),
            master: MasterConfig::default(),
            slave: SlaveConfig::default(),
            algorithms: AlgorithmParams::default(),
            springs: default_springs(),
            session: SessionConfig::default(),
            rate_delay: RateDelayConfig::default(),
            experiment: ExperimentConfig::default(),
        }
    }
}

/// Five springs of increasing stiffness, all resting at the same height.
fn default_springs() -> Vec<ContactModel> {
    [100.0, 150.0, 200.0, 250.0, 300.0]
        .into_iter()
        .map(|k| ContactModel::new(k, -0.085))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub period_us: u64,
    /// Run length; `None` runs until the operator quits.
    pub duration_s: Option<f64>,
    pub master_core: Option<usize>,
    pub slave_core: Option<usize>,
    /// Telemetry plot refresh, milliseconds.
    pub render_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            period_us: 1_000,
            duration_s: None,
            master_core: None,
            slave_core: None,
            render_interval_ms: 200,
        }
    }
}

impl TimingConfig {
    pub fn period(&self) -> Duration {
        Duration::from_micros(self.period_us)
    }

    pub fn dt(&self) -> f64 {
        self.period().as_secs_f64()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_s.and_then(|s| Duration::try_from_secs_f64(s).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub base_delay_ms: f64,
    pub jitter_std_dev_ms: f64,
    pub max_delay_ms: f64,
    pub delay_step_ms: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 0.0,
            jitter_std_dev_ms: 0.0,
            max_delay_ms: MAX_LINK_DELAY.as_millis() as f64,
            delay_step_ms: 1.0,
        }
    }
}

impl LinkConfig {
    pub fn profile(&self) -> LinkProfile {
        LinkProfile {
            base_delay: millis(self.base_delay_ms),
            jitter_std_dev: millis(self.jitter_std_dev_ms),
        }
    }

    pub fn max_delay(&self) -> Duration {
        millis(self.max_delay_ms)
    }

    pub fn delay_step(&self) -> Duration {
        millis(self.delay_step_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    pub initial_hz: f64,
    pub min_hz: f64,
    pub max_hz: f64,
    pub step_hz: f64,
    /// Rate applied while the reference profile is active.
    pub reference_hz: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            initial_hz: 1_000.0,
            min_hz: 10.0,
            max_hz: 1_000.0,
            step_hz: 10.0,
            reference_hz: 400.0,
        }
    }
}

impl RateConfig {
    pub fn clamp(&self, hz: f64) -> f64 {
        hz.clamp(self.min_hz, self.max_hz)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Relative perceptual deadband on outgoing velocity; disabled when unset.
    pub deadband: Option<f64>,
    /// Position drift, m, allowed before a command goes out anyway while the
    /// deadband is enabled.
    pub position_deadband: f64,
    pub force_feedback: bool,
    pub initial_algorithm: Algorithm,
    pub initial_spring: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            deadband: None,
            position_deadband: 0.0005,
            force_feedback: true,
            initial_algorithm: Algorithm::None,
            initial_spring: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaveConfig {
    /// Simulated tool mass, kg.
    pub mass: f64,
    /// Fraction of velocity removed per tick, in `[0, 1)`.
    pub damping: f64,
    pub tracker: TrackerConfig,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            mass: 0.1,
            damping: 0.02,
            tracker: TrackerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("data/session"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateDelayConfig {
    pub per_hz_us: u64,
    pub constant_us: u64,
}

impl Default for RateDelayConfig {
    fn default() -> Self {
        Self {
            per_hz_us: 1_000,
            constant_us: 2_000,
        }
    }
}

impl From<RateDelayConfig> for RateDelay {
    fn from(cfg: RateDelayConfig) -> Self {
        RateDelay::new(
            Duration::from_micros(cfg.per_hz_us),
            Duration::from_micros(cfg.constant_us),
        )
    }
}

/// One network-resources trial: which transform, and how rate costs delay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialConfig {
    pub algorithm: Algorithm,
    #[serde(flatten)]
    pub rate_delay: RateDelayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Springs the network-resources controller toggles between; out-of-range
    /// indices fall back to the last configured spring.
    pub compared_springs: (usize, usize),
    /// Empty means one trial per algorithm with the top-level `[rate_delay]` coupling.
    pub trials: Vec<TrialConfig>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            compared_springs: (1, 3),
            trials: Vec::new(),
        }
    }
}

impl TeleopConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Trials to run, in order.
    pub fn trials(&self) -> Vec<TrialConfig> {
        if !self.experiment.trials.is_empty() {
            return self.experiment.trials.clone();
        }
        Algorithm::ALL
            .into_iter()
            .map(|algorithm| TrialConfig {
                algorithm,
                rate_delay: self.rate_delay,
            })
            .collect()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: TeleopConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.timing.period_us == 0 {
            return invalid("timing.period_us must be > 0".into());
        }
        if let Some(s) = self.timing.duration_s.filter(|s| !(s.is_finite() && *s > 0.0)) {
            return invalid(format!("timing.duration_s must be > 0, got {s}"));
        }
        if !(self.max_force.is_finite() && self.max_force > 0.0) {
            return invalid(format!("max_force must be > 0, got {}", self.max_force));
        }
        if self.springs.is_empty() {
            return invalid("at least one [[springs]] entry is required".into());
        }
        if self.master.initial_spring >= self.springs.len() {
            return invalid(format!(
                "master.initial_spring {} out of range ({} springs)",
                self.master.initial_spring,
                self.springs.len()
            ));
        }
        if let Some(k) = self.springs.iter().find(|s| s.stiffness < 0.0) {
            return invalid(format!("spring stiffness must be >= 0, got {}", k.stiffness));
        }

        let rate = &self.rate;
        if rate.min_hz <= 0.0 || rate.min_hz > rate.max_hz {
            return invalid(format!(
                "rate bounds must satisfy 0 < min_hz <= max_hz, got [{}, {}]",
                rate.min_hz, rate.max_hz
            ));
        }
        if rate.step_hz <= 0.0 || rate.initial_hz <= 0.0 || rate.reference_hz <= 0.0 {
            return invalid("rate.initial_hz, step_hz and reference_hz must be > 0".into());
        }

        if !(self.slave.mass.is_finite() && self.slave.mass > 0.0) {
            return invalid(format!("slave.mass must be > 0, got {}", self.slave.mass));
        }
        if !(0.0..1.0).contains(&self.slave.damping) {
            return invalid(format!(
                "slave.damping must lie in [0, 1), got {}",
                self.slave.damping
            ));
        }

        let link = &self.link;
        if link.base_delay_ms < 0.0 || link.jitter_std_dev_ms < 0.0 || link.delay_step_ms < 0.0 {
            return invalid("link delays must be >= 0".into());
        }
        if link.max_delay() > MAX_LINK_DELAY {
            return invalid(format!(
                "link.max_delay_ms must be <= {} ms",
                MAX_LINK_DELAY.as_millis()
            ));
        }

        if let Some(t) = self.master.deadband.filter(|t| *t < 0.0) {
            return invalid(format!("master.deadband must be >= 0, got {t}"));
        }
        if self.master.position_deadband < 0.0 {
            return invalid(format!(
                "master.position_deadband must be >= 0, got {}",
                self.master.position_deadband
            ));
        }

        self.algorithms.validate()
    }
}
