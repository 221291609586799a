//! Error types for the teleoperation testbed.
//!
//! Stale packets and force saturation are normal operation and never surface here.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Haptic device failures. Fatal at startup: the loops never start.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to open haptic device: {0}")]
    Open(String),

    #[error("failed to calibrate haptic device: {0}")]
    Calibration(String),

    #[error("haptic device is not open")]
    NotOpen,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("configuration validation failed: {0}")]
    Invalid(String),
}

/// Session persistence failures. Logged by the writer, never fed back into the loops.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("session CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("session writer has shut down")]
    Closed,
}

#[derive(Error, Debug)]
pub enum TeleopError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

pub type Result<T, E = TeleopError> = std::result::Result<T, E>;
