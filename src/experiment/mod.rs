//! Experiment controllers.
//!
//! A controller turns operator commands into changes of the shared configuration and
//! the link profile, and emits trial summaries. The control loops never know which
//! controller is active; they only see the `SharedConfig` and the link change.

pub mod console;
pub mod manual;
pub mod network_resources;

use std::time::Duration;

use clap::ValueEnum;
use log::info;

use crate::{
    context::AppContext,
    utils::session::RatingKind,
};

/// Operator input, arrow-key style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Up,
    Down,
    Left,
    Right,
    NextAlgorithm,
    ToggleReference,
    ToggleForceFeedback,
    Spring(usize),
    Rate(i32),
    Save,
    Status,
    Quit,
}

/// What the operator thread should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The controller has no more trials, or the operator asked to quit.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ControllerKind {
    #[default]
    Manual,
    NetworkResources,
}

pub trait ExperimentController: Send {
    fn name(&self) -> &'static str;

    /// Apply the starting configuration before the loops run.
    fn init(&mut self, _ctx: &AppContext) {}

    fn up_key(&mut self, _ctx: &AppContext) {}

    fn down_key(&mut self, _ctx: &AppContext) {}

    fn left_key(&mut self, _ctx: &AppContext) {}

    fn right_key(&mut self, _ctx: &AppContext) {}

    fn next_algorithm(&mut self, _ctx: &AppContext) {}

    fn toggle_reference(&mut self, _ctx: &AppContext) {}

    fn rate(&mut self, _ctx: &AppContext, _rating: i32) {}

    /// Persist the current trial. Returns true once the experiment is complete.
    fn save(&mut self, _ctx: &AppContext) -> bool {
        false
    }
}

/// Route one command to the controller. Force feedback, spring selection, status and
/// quit are the same for every controller.
pub fn dispatch(controller: &mut dyn ExperimentController, ctx: &AppContext, cmd: Command) -> Flow {
    match cmd {
        Command::Up => controller.up_key(ctx),
        Command::Down => controller.down_key(ctx),
        Command::Left => controller.left_key(ctx),
        Command::Right => controller.right_key(ctx),
        Command::NextAlgorithm => controller.next_algorithm(ctx),
        Command::ToggleReference => controller.toggle_reference(ctx),
        Command::Rate(r) => controller.rate(ctx, r),
        Command::ToggleForceFeedback => {
            let s = ctx.shared.update(|s| s.force_feedback = !s.force_feedback);
            info!("force feedback {}", if s.force_feedback { "on" } else { "off" });
        }
        Command::Spring(idx) => {
            ctx.select_spring(idx);
        }
        Command::Status => log_status(ctx),
        Command::Save => {
            if controller.save(ctx) {
                info!("[{}] all trials complete", controller.name());
                return Flow::Finished;
            }
        }
        Command::Quit => return Flow::Finished,
    }
    Flow::Continue
}

fn log_status(ctx: &AppContext) {
    let s = ctx.shared.snapshot();
    info!(
        "algorithm={} spring={} rate={:.0}/{:.0} Hz delay={:.1} ms reference={} feedback={}",
        s.algorithm,
        s.spring_index,
        s.master_rate_hz,
        s.slave_rate_hz,
        as_millis(ctx.link.profile().base_delay),
        s.reference_mode,
        s.force_feedback,
    );
}

pub(crate) fn as_millis(d: Duration) -> f64 {
    d.as_micros() as f64 / 1e3
}

/// Ratings alternate between smoothness and delay, starting with smoothness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingCycle {
    next: RatingKind,
}

impl Default for RatingCycle {
    fn default() -> Self {
        Self {
            next: RatingKind::Smoothness,
        }
    }
}

impl RatingCycle {
    pub fn advance(&mut self) -> RatingKind {
        let kind = self.next;
        self.next = match kind {
            RatingKind::Smoothness => RatingKind::Delay,
            RatingKind::Delay => RatingKind::Smoothness,
        };
        kind
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
