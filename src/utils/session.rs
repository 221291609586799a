//! Experiment/session persistence.
//!
//! Control loops hand records to a `SessionSink` and move on. The CSV store forwards
//! them over an unbounded channel to a background writer thread, so a slow disk or a
//! failed writer never stalls a tick. Records sent after the writer stopped (failure
//! or `finish`) are dropped and counted; the first drop is logged.

use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{error, info, warn};
use serde::Serialize;

use crate::{error::SessionError, network::message::Node, stability::Algorithm};

pub const STATES_FILE: &str = "states.csv";
pub const TRIALS_FILE: &str = "trials.csv";

/// One control tick of one node, constrained-axis values only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateRecord {
    pub t_us: u64,
    pub node: Node,
    pub sequence: i64,
    pub position: f64,
    pub velocity: f64,
    pub force: f64,
    pub sent: bool,
    pub received: bool,
    pub reference: bool,
    pub algorithm: Algorithm,
    pub spring: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingKind {
    Smoothness,
    Delay,
}

/// Operator verdict on one configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    pub trial: usize,
    pub algorithm: Algorithm,
    pub spring: usize,
    pub packet_rate_hz: f64,
    pub delay_ms: f64,
    pub rating_kind: RatingKind,
    pub rating: i32,
}

pub trait SessionSink: Send + Sync {
    fn record_state(&self, record: StateRecord);
    fn record_trial(&self, record: TrialRecord);
}

/// Discards everything; used when persistence is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSession;

impl SessionSink for NullSession {
    fn record_state(&self, _record: StateRecord) {}
    fn record_trial(&self, _record: TrialRecord) {}
}

enum SessionEvent {
    State(StateRecord),
    Trial(TrialRecord),
    Shutdown,
}

/// Cloneable producer side of a [`CsvSessionStore`].
#[derive(Clone)]
pub struct SessionHandle {
    tx: Sender<SessionEvent>,
    dropped: Arc<AtomicU64>,
}

impl SessionHandle {
    fn send(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() && self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
            warn!("session writer gone, further records are dropped");
        }
    }

    /// Records lost because the writer had already stopped, across all handles.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SessionSink for SessionHandle {
    fn record_state(&self, record: StateRecord) {
        self.send(SessionEvent::State(record));
    }

    fn record_trial(&self, record: TrialRecord) {
        self.send(SessionEvent::Trial(record));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub states: u64,
    pub trials: u64,
}

pub struct CsvSessionStore {
    dir: PathBuf,
    tx: Sender<SessionEvent>,
    dropped: Arc<AtomicU64>,
    writer: JoinHandle<Result<SessionCounts, SessionError>>,
}

impl CsvSessionStore {
    /// Create `dir`, open both CSV files and start the writer thread. Files are opened
    /// here so that an unwritable directory fails at startup rather than silently.
    pub fn create(dir: &Path) -> Result<Self, SessionError> {
        create_dir_all(dir)?;
        let states = csv::Writer::from_path(dir.join(STATES_FILE))?;
        let trials = csv::Writer::from_path(dir.join(TRIALS_FILE))?;

        let (tx, rx) = unbounded();
        let writer = thread::Builder::new()
            .name("session-writer".into())
            .spawn(move || {
                let result = write_events(rx, states, trials);
                if let Err(e) = &result {
                    error!("session writer stopped: {e}");
                }
                result
            })?;

        info!("session output in {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            writer,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
        }
    }

    /// Write everything queued so far, then stop the writer. Handles that are still
    /// alive (e.g. held by the console thread) drop and count further records.
    pub fn finish(self) -> Result<SessionCounts, SessionError> {
        let _ = self.tx.send(SessionEvent::Shutdown);
        self.writer
            .join()
            .unwrap_or_else(|_| Err(SessionError::Closed))
    }
}

fn write_events<W: std::io::Write>(
    rx: Receiver<SessionEvent>,
    mut states: csv::Writer<W>,
    mut trials: csv::Writer<W>,
) -> Result<SessionCounts, SessionError> {
    let mut counts = SessionCounts::default();
    for event in rx {
        match event {
            SessionEvent::State(r) => {
                states.serialize(r)?;
                counts.states += 1;
            }
            SessionEvent::Trial(r) => {
                trials.serialize(r)?;
                trials.flush()?;
                counts.trials += 1;
            }
            SessionEvent::Shutdown => break,
        }
    }
    states.flush()?;
    trials.flush()?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(t_us: u64) -> StateRecord {
        StateRecord {
            t_us,
            node: Node::Slave,
            sequence: t_us as i64,
            position: -0.08,
            velocity: 0.01,
            force: -0.2,
            sent: true,
            received: false,
            reference: false,
            algorithm: Algorithm::Wave,
            spring: 2,
        }
    }

    #[test]
    fn finish_writes_everything_queued_before_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvSessionStore::create(dir.path()).unwrap();
        let handle = store.handle();

        for t in 0..250 {
            handle.record_state(state(t));
        }
        handle.record_trial(TrialRecord {
            trial: 0,
            algorithm: Algorithm::Iss,
            spring: 1,
            packet_rate_hz: 40.0,
            delay_ms: 42.0,
            rating_kind: RatingKind::Smoothness,
            rating: 4,
        });

        let counts = store.finish().unwrap();
        assert_eq!(counts, SessionCounts { states: 250, trials: 1 });

        assert_eq!(handle.dropped(), 0);

        // late records are counted and dropped rather than blocking or panicking
        handle.record_state(state(999));
        handle.clone().record_state(state(1_000));
        assert_eq!(handle.dropped(), 2);

        let states = std::fs::read_to_string(dir.path().join(STATES_FILE)).unwrap();
        assert_eq!(states.lines().count(), 251);
        assert!(states.lines().nth(1).unwrap().contains(",slave,"));
        assert!(states.contains(",wave,"));

        let trials = std::fs::read_to_string(dir.path().join(TRIALS_FILE)).unwrap();
        assert!(trials.starts_with("trial,algorithm,spring"));
        assert!(trials.contains("iss,1,40.0,42.0,smoothness,4"));
    }

    #[test]
    fn unusable_directory_fails_at_startup() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            CsvSessionStore::create(file.path()),
            Err(SessionError::Io(_))
        ));
    }
}
