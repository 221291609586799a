//! console.rs
//! Line-based operator console on stdin, standing in for the render window's key
//! callbacks. One command per line:
//!
//! | input                    | command             |
//! |--------------------------|---------------------|
//! | `w` `up` / `s` `down`    | up / down key       |
//! | `a` `left` / `d` `right` | left / right key    |
//! | `n` `next`               | next algorithm      |
//! | `r` `ref`                | toggle reference    |
//! | `f` `feedback`           | toggle force output |
//! | `spring <i>`             | select spring       |
//! | `<digit>` / `rate <n>`   | submit a rating     |
//! | `save`                   | save trial          |
//! | `?` `status`             | log current state   |
//! | `q` `quit`               | stop the run        |

use std::{
    io::{self, BufRead},
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};

use crate::{
    context::AppContext,
    experiment::{Command, ExperimentController, Flow, dispatch},
};

pub fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let head = words.next()?.to_ascii_lowercase();
    let arg = words.next();

    let cmd = match head.as_str() {
        "w" | "up" => Command::Up,
        "s" | "down" => Command::Down,
        "a" | "left" => Command::Left,
        "d" | "right" => Command::Right,
        "n" | "next" => Command::NextAlgorithm,
        "r" | "ref" | "reference" => Command::ToggleReference,
        "f" | "feedback" => Command::ToggleForceFeedback,
        "save" => Command::Save,
        "?" | "status" => Command::Status,
        "q" | "quit" | "exit" => Command::Quit,
        "spring" => Command::Spring(arg?.parse().ok()?),
        "rate" => Command::Rate(arg?.parse().ok()?),
        other => Command::Rate(other.parse().ok()?),
    };
    Some(cmd)
}

/// Feed commands from `input` to the controller until the input ends, the operator
/// quits, or the run is stopped elsewhere. Stops the run on quit or completion.
pub fn run_console<R: BufRead>(
    input: R,
    ctx: &AppContext,
    controller: &mut dyn ExperimentController,
) {
    for line in input.lines() {
        if !ctx.is_running() {
            break;
        }
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("console read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(cmd) => {
                debug!("console command {cmd:?}");
                if dispatch(controller, ctx, cmd) == Flow::Finished {
                    ctx.stop();
                    break;
                }
            }
            None => warn!("unrecognised command '{}'", line.trim()),
        }
    }
    debug!("console closed");
}

/// Start the console on stdin. The thread is never joined: a blocked read cannot be
/// interrupted, and the process exit reclaims it.
pub fn spawn_console(
    ctx: Arc<AppContext>,
    mut controller: Box<dyn ExperimentController>,
) -> io::Result<JoinHandle<()>> {
    info!(
        "[{}] console ready: w/s/a/d, n, r, f, spring <i>, <rating>, save, ?, q",
        controller.name()
    );
    thread::Builder::new().name("console".into()).spawn(move || {
        run_console(io::stdin().lock(), &ctx, controller.as_mut());
    })
}
