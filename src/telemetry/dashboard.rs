//! Periodic SVG trace render of the telemetry board.
//!
//! One background thread wakes every render interval, drains the board and redraws a
//! 2x2 grid (positions, forces, indentation, status). Output goes to a temp file that
//! is renamed over `telemetry.svg`, so a viewer never sees a half-written image.

use std::{
    collections::VecDeque,
    error::Error,
    fs,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{info, warn};
use plotters::{coord::Shift, prelude::*};

use crate::telemetry::{MAX_POINTS, TelemetryBoard, TelemetryHistory};

pub const DASHBOARD_FILE: &str = "telemetry.svg";

pub struct DashboardHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl DashboardHandle {
    /// Stop the render thread after one last frame.
    pub fn stop(self) {
        self.running.store(false, Ordering::Release);
        if self.thread.join().is_err() {
            warn!("dashboard render thread panicked");
        }
    }
}

pub fn start_dashboard(
    board: Arc<TelemetryBoard>,
    out_dir: &Path,
    interval: Duration,
) -> std::io::Result<DashboardHandle> {
    fs::create_dir_all(out_dir)?;
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    let out_dir = out_dir.to_path_buf();

    let thread = thread::Builder::new()
        .name("dashboard".into())
        .spawn(move || render_loop(&board, &out_dir, interval, &flag))?;

    Ok(DashboardHandle { running, thread })
}

fn render_loop(board: &TelemetryBoard, out_dir: &Path, interval: Duration, running: &AtomicBool) {
    let mut history = TelemetryHistory::default();
    let target = out_dir.join(DASHBOARD_FILE);
    let temp = out_dir.join("telemetry_temp.svg");

    loop {
        let keep_going = running.load(Ordering::Acquire);

        // nothing new since the last frame: skip the redraw
        if history.drain(board) > 0 || !keep_going {
            if let Err(e) = render_svg(&temp, &target, &history, board.dropped()) {
                warn!("dashboard render failed: {e}");
            }
        }

        if !keep_going {
            break;
        }
        thread::sleep(interval);
    }

    info!("dashboard written to {}", target.display());
}

pub fn render_svg(
    temp: &Path,
    target: &Path,
    history: &TelemetryHistory,
    dropped: u64,
) -> Result<(), Box<dyn Error>> {
    {
        let root = SVGBackend::new(temp, (1280, 900)).into_drawing_area();
        root.fill(&WHITE)?;

        let (plots, status) = root.split_vertically(840);
        let areas = plots.split_evenly((2, 2));

        plot_pair(
            &areas[0],
            "Position [m]",
            (&history.master_position, "master"),
            (&history.slave_position, "slave"),
        )?;
        plot_pair(
            &areas[1],
            "Force [N]",
            (&history.master_force, "master"),
            (&history.slave_force, "slave"),
        )?;
        plot_series(&areas[2], "Indentation [m]", &history.indentation)?;

        let status_font = ("sans-serif", 18).into_font().color(&BLACK);
        let status_text = match &history.latest {
            Some(f) => format!(
                "Algorithm: {} | Rate: {:.0} Hz | Delay: {:.1} ms | Dropped frames: {}",
                f.algorithm, f.packet_rate_hz, f.delay_ms, dropped
            ),
            None => "Waiting for telemetry".to_string(),
        };
        status.draw(&Text::new(status_text, (40, 20), status_font))?;
        root.present()?;
    }

    fs::rename(temp, target)?;
    Ok(())
}

fn y_range<'a>(series: impl IntoIterator<Item = &'a VecDeque<f64>>) -> (f64, f64) {
    let (min, max) = series
        .into_iter()
        .flat_map(|s| s.iter().copied())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if min.is_finite() && max.is_finite() {
        (min, max.max(min + 1e-6))
    } else {
        (0.0, 1.0)
    }
}

fn plot_series(
    area: &DrawingArea<SVGBackend, Shift>,
    title: &str,
    data: &VecDeque<f64>,
) -> Result<(), Box<dyn Error>> {
    let (min_y, max_y) = y_range([data]);
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(50)
        .build_cartesian_2d(0..MAX_POINTS, min_y..max_y)?;
    chart.configure_mesh().disable_mesh().draw()?;
    chart.draw_series(LineSeries::new(
        data.iter().enumerate().map(|(i, v)| (i, *v)),
        &BLUE,
    ))?;
    Ok(())
}

fn plot_pair(
    area: &DrawingArea<SVGBackend, Shift>,
    title: &str,
    first: (&VecDeque<f64>, &str),
    second: (&VecDeque<f64>, &str),
) -> Result<(), Box<dyn Error>> {
    let (min_y, max_y) = y_range([first.0, second.0]);
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(50)
        .build_cartesian_2d(0..MAX_POINTS, min_y..max_y)?;
    chart.configure_mesh().disable_mesh().draw()?;

    for ((data, label), color) in [(first, BLUE), (second, RED)] {
        chart
            .draw_series(LineSeries::new(
                data.iter().enumerate().map(|(i, v)| (i, *v)),
                &color,
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .border_style(BLACK)
        .draw()?;
    Ok(())
}
