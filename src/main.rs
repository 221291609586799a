//! # Haptic teleoperation testbed entry point
//!
//! Loads the configuration, applies command-line overrides, opens the (simulated)
//! haptic device and runs the master and slave loops until the run duration elapses
//! or the operator quits from the console.
//!
//! ## Outputs (under the session directory)
//! - `states.csv`, `trials.csv`: session store.
//! - `loop_summary.csv`: loop timing diagnostics.
//! - `telemetry.svg`: trace plots, unless `--headless`.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use log::{error, info};

use haptic_teleop::{
    config::TeleopConfig,
    context::AppContext,
    error::{Result, TeleopError},
    experiment::ControllerKind,
    master::device::{PressMotion, SimulatedDevice},
    runner::{RunOptions, run},
    stability::Algorithm,
};

#[derive(Parser, Debug)]
#[command(name = "haptic_teleop", version, about = "Bilateral haptic teleoperation testbed")]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run length in seconds (overrides timing.duration_s).
    #[arg(short, long)]
    duration: Option<f64>,

    /// Skip the telemetry plot.
    #[arg(long)]
    headless: bool,

    /// Starting stability transform.
    #[arg(short, long, value_enum)]
    algorithm: Option<Algorithm>,

    #[arg(long, value_enum, default_value_t = ControllerKind::Manual)]
    controller: ControllerKind,

    /// Session output directory (overrides session.output_dir).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Do not read operator commands from stdin.
    #[arg(long)]
    no_console: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => TeleopConfig::load(path),
        None => Ok(TeleopConfig::default()),
    };
    init_logging(loaded.as_ref().ok().and_then(|c| c.log_level.as_deref()));

    let result = loaded
        .map_err(TeleopError::from)
        .and_then(|cfg| apply_overrides(cfg, &cli))
        .and_then(|cfg| start(cfg, &cli));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: Option<&str>) {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.init();
}

fn apply_overrides(mut cfg: TeleopConfig, cli: &Cli) -> Result<TeleopConfig> {
    if let Some(d) = cli.duration {
        cfg.timing.duration_s = Some(d);
    }
    if let Some(a) = cli.algorithm {
        cfg.master.initial_algorithm = a;
    }
    if let Some(dir) = &cli.output {
        cfg.session.output_dir = dir.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn start(cfg: TeleopConfig, cli: &Cli) -> Result<()> {
    info!("=== TELEOPERATION TESTBED START ===");
    let opts = RunOptions {
        output_dir: cfg.session.output_dir.clone(),
        headless: cli.headless,
        controller: cli.controller,
        console: !cli.no_console,
    };

    let ctx = AppContext::new(cfg);
    let spring = ctx.spring(ctx.shared.snapshot().spring_index);
    let device = SimulatedDevice::new(PressMotion::around_surface(
        spring.rest_position,
        spring.length * 0.25,
    ));

    let report = run(ctx, Box::new(device), &opts)?;
    for s in &report.summaries {
        info!(
            "[{}] {} ticks, {} overruns, {} sent / {} received",
            s.node.name(),
            s.ticks,
            s.overruns,
            s.sent,
            s.received
        );
    }
    info!("=== TELEOPERATION TESTBED FINISHED ===");
    Ok(())
}
