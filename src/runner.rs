//! runner.rs
//! Process lifecycle: init -> run -> stop -> teardown.
//! - device open and calibration are fatal; the loops never start on failure
//! - master and slave loops run on their own max-priority threads, optionally pinned
//! - the driver joins both loops before closing the device
//! - in-flight packets are discarded at shutdown

use std::{
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{error, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::{
    context::AppContext,
    error::{Result, TeleopError},
    experiment::{
        ControllerKind, ExperimentController, console::spawn_console, manual::ManualController,
        network_resources::NetworkResourcesController,
    },
    master::{device::HapticDevice, master_loop::MasterLoop},
    slave::slave_loop::SlaveLoop,
    telemetry::{
        NullSurface, TelemetryBoard, VisualizationSurface,
        dashboard::{DashboardHandle, start_dashboard},
    },
    utils::{
        export::export_loop_summaries,
        metrics::LoopSummary,
        session::{CsvSessionStore, NullSession, SessionCounts, SessionSink},
    },
};

const STOP_POLL: Duration = Duration::from_millis(20);

/// Drive `tick` once per `period` until the running flag clears.
///
/// Sleeps until the next release when ahead of schedule. A late release runs at once,
/// and the schedule restarts from it rather than bursting to catch up.
pub fn spin_periodic<F>(period: Duration, ctx: &AppContext, mut tick: F)
where
    F: FnMut(Instant),
{
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    let mut next_release = Instant::now() + period;

    while ctx.is_running() {
        let now = Instant::now();
        if now < next_release {
            sleeper.sleep(next_release - now);
        }

        let released = Instant::now();
        tick(released);

        next_release = (next_release + period).max(released);
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub headless: bool,
    pub controller: ControllerKind,
    /// Read operator commands from stdin.
    pub console: bool,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub summaries: Vec<LoopSummary>,
    pub session: Option<SessionCounts>,
}

/// Open and calibrate the device. A device that opened but failed calibration is
/// closed again before the error is returned.
pub fn prepare_device(device: &mut dyn HapticDevice) -> Result<()> {
    device.open()?;
    if let Err(e) = device.calibrate() {
        if let Err(close_err) = device.close() {
            warn!("closing uncalibrated device failed: {close_err}");
        }
        return Err(e.into());
    }
    info!("haptic device ready");
    Ok(())
}

pub fn build_controller(
    kind: ControllerKind,
    ctx: &AppContext,
    session: Arc<dyn SessionSink>,
) -> Box<dyn ExperimentController> {
    match kind {
        ControllerKind::Manual => Box::new(ManualController::new(session)),
        ControllerKind::NetworkResources => {
            Box::new(NetworkResourcesController::new(ctx, session))
        }
    }
}

/// Spawn a control-loop thread at maximum priority, pinned to `core` if given.
fn spawn_loop<T, F>(name: &'static str, core: Option<usize>, body: F) -> Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn_with_priority(ThreadPriority::Max, move |priority| {
            if let Err(e) = priority {
                warn!("[{name}] running at default priority: {e:?}");
            }
            if let Some(core) = core {
                pin_to_core(name, core);
            }
            body()
        })
        .map_err(|source| TeleopError::Spawn { name, source })
}

fn pin_to_core(name: &str, core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(id) if core_affinity::set_for_current(*id) => info!("[{name}] pinned to core {core}"),
        Some(_) => error!("[{name}] failed to pin to core {core}"),
        None => error!("[{name}] core {core} not available"),
    }
}

/// Block until the run is stopped or `duration` elapses.
fn wait_for_stop(ctx: &AppContext, duration: Option<Duration>) {
    let deadline = duration.map(|d| Instant::now() + d);
    while ctx.is_running() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("run duration reached");
            ctx.stop();
            break;
        }
        thread::sleep(STOP_POLL);
    }
}

fn join<T>(name: &'static str, handle: JoinHandle<T>) -> Result<T> {
    handle.join().map_err(|_| TeleopError::ThreadPanicked(name))
}

/// Run both loops for the configured duration (or until the operator quits).
pub fn run(
    ctx: Arc<AppContext>,
    mut device: Box<dyn HapticDevice>,
    opts: &RunOptions,
) -> Result<RunReport> {
    let cfg = &ctx.config;

    let store = if cfg.session.enabled {
        Some(CsvSessionStore::create(&opts.output_dir)?)
    } else {
        None
    };
    let session: Arc<dyn SessionSink> = match &store {
        Some(s) => Arc::new(s.handle()),
        None => Arc::new(NullSession),
    };

    let (surface, dashboard): (Arc<dyn VisualizationSurface>, Option<DashboardHandle>) =
        if opts.headless {
            (Arc::new(NullSurface) as Arc<dyn VisualizationSurface>, None)
        } else {
            let board = Arc::new(TelemetryBoard::default());
            let interval = Duration::from_millis(cfg.timing.render_interval_ms.max(1));
            let handle = start_dashboard(board.clone(), &opts.output_dir, interval)
                .map_err(|source| TeleopError::Spawn {
                    name: "dashboard",
                    source,
                })?;
            (board as Arc<dyn VisualizationSurface>, Some(handle))
        };

    if let Err(e) = prepare_device(device.as_mut()) {
        error!("device setup failed, loops not started: {e}");
        teardown(store, dashboard);
        return Err(e);
    }

    let mut controller = build_controller(opts.controller, &ctx, session.clone());
    controller.init(&ctx);

    let period = cfg.timing.period();
    info!(
        "starting loops: period={}us algorithm={} controller={}",
        cfg.timing.period_us,
        ctx.shared.snapshot().algorithm,
        controller.name()
    );

    let slave_handle = {
        let (ctx, session, surface) = (ctx.clone(), session.clone(), surface.clone());
        spawn_loop("slave", cfg.timing.slave_core, move || {
            let mut slave = SlaveLoop::new(ctx, session, surface);
            slave.run(period);
            slave.into_stats()
        })
    };
    let slave_handle = match slave_handle {
        Ok(h) => h,
        Err(e) => {
            if let Err(close_err) = device.close() {
                warn!("device close failed: {close_err}");
            }
            teardown(store, dashboard);
            return Err(e);
        }
    };

    let master_handle = {
        let (ctx, session, surface) = (ctx.clone(), session.clone(), surface.clone());
        spawn_loop("master", cfg.timing.master_core, move || {
            let mut master = MasterLoop::new(ctx, device, session, surface);
            master.run(period);
            master.into_parts()
        })
    };
    let master_handle = match master_handle {
        Ok(h) => h,
        Err(e) => {
            ctx.stop();
            let _ = join("slave", slave_handle);
            teardown(store, dashboard);
            return Err(e);
        }
    };

    if opts.console {
        if let Err(e) = spawn_console(ctx.clone(), controller) {
            warn!("operator console unavailable: {e}");
        }
    } else if cfg.timing.duration().is_none() {
        warn!("no console and no duration: running until the process is killed");
    }

    wait_for_stop(&ctx, cfg.timing.duration());
    ctx.stop();

    let master = join("master", master_handle);
    let slave = join("slave", slave_handle);
    ctx.link.clear_channels();

    let mut summaries = Vec::new();
    let mut failure = None;
    match master {
        Ok((mut device, stats)) => {
            if let Err(e) = device.close() {
                warn!("device close failed: {e}");
            }
            summaries.push(stats.summary(ctx.link.feedback().superseded()));
        }
        Err(e) => failure = Some(e),
    }
    match slave {
        Ok(stats) => summaries.push(stats.summary(ctx.link.commands().superseded())),
        Err(e) => failure = failure.or(Some(e)),
    }

    if let Err(e) = export_loop_summaries(&opts.output_dir, &summaries) {
        warn!("loop summary export failed: {e}");
    }
    drop(session);
    let counts = teardown(store, dashboard);

    match failure {
        Some(e) => Err(e),
        None => {
            info!("run complete");
            Ok(RunReport {
                summaries,
                session: counts,
            })
        }
    }
}

/// Flush the session and take the final dashboard frame.
fn teardown(store: Option<CsvSessionStore>, dashboard: Option<DashboardHandle>) -> Option<SessionCounts> {
    let counts = store.and_then(|s| match s.finish() {
        Ok(c) => {
            info!("session saved: {} states, {} trials", c.states, c.trials);
            Some(c)
        }
        Err(e) => {
            error!("session could not be saved: {e}");
            None
        }
    });
    if let Some(d) = dashboard {
        d.stop();
    }
    counts
}
