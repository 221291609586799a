//! # Bilateral haptic teleoperation testbed
//!
//! A master node samples the operator's haptic device and displays force feedback; a
//! slave node drives a simulated tool mass against a compliant spring. The two talk
//! only through a simulated link with configurable delay and jitter, gated by per-node
//! packet-rate governors.
//!
//! ## Key Architecture
//! - **Link:** two freshest-wins delay channels sharing one delay/jitter profile.
//! - **Loops:** master and slave tick at a fixed period (default 1 ms) on their own
//!   max-priority threads; stale data is held, never treated as an error.
//! - **Stability transforms:** none, wave variables, ISS, passivity control and
//!   model-mediated teleoperation, swapped at runtime by the experiment controller.
//!
//! ## Outputs
//! - `states.csv` / `trials.csv`: per-tick states and operator ratings.
//! - `loop_summary.csv`: per-loop jitter, overruns and traffic.
//! - `telemetry.svg`: rolling position/force/indentation traces.

pub mod config;
pub mod context;
pub mod error;
pub mod experiment;
pub mod master;
pub mod network;
pub mod runner;
pub mod slave;
pub mod stability;
pub mod telemetry;
pub mod utils;

/// Cartesian vector; only the constrained axis carries information.
pub type Vector3 = nalgebra::Vector3<f64>;
