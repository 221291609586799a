//! End-of-run diagnostics export.
//!
//! One row per control loop: release jitter, work time, overruns and link traffic,
//! written to `loop_summary.csv` next to the session files.

use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
};

use log::info;

use crate::{error::SessionError, utils::metrics::LoopSummary};

pub const SUMMARY_FILE: &str = "loop_summary.csv";

pub fn export_loop_summaries(
    dir: &Path,
    summaries: &[LoopSummary],
) -> Result<PathBuf, SessionError> {
    create_dir_all(dir)?;
    let path = dir.join(SUMMARY_FILE);

    let mut writer = csv::Writer::from_path(&path)?;
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;

    for s in summaries {
        info!(
            "[{}] ticks={} overruns={} sent={} received={} superseded={} jitter mean={:.1}us max={:.1}us",
            s.node.name(),
            s.ticks,
            s.overruns,
            s.sent,
            s.received,
            s.superseded,
            s.jitter_mean_us,
            s.jitter_max_us,
        );
    }
    info!("loop summary exported to {}", path.display());
    Ok(path)
}
