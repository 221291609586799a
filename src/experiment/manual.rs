//! manual.rs
//! Free-form tuning: the operator steps packet rate and link delay directly.
//! - up/down: packet rate of both nodes by `rate.step_hz`, clamped
//! - left/right: link base delay by `link.delay_step_ms`, clamped
//! - reference toggle: {no compensation, reference rate, zero delay}, restored on exit

use std::{sync::Arc, time::Duration};

use log::info;

use crate::{
    context::AppContext,
    experiment::{ExperimentController, RatingCycle, as_millis},
    stability::Algorithm,
    utils::session::{SessionSink, TrialRecord},
};

#[derive(Debug, Clone, Copy)]
struct Saved {
    algorithm: Algorithm,
    rate_hz: f64,
    delay: Duration,
}

pub struct ManualController {
    session: Arc<dyn SessionSink>,
    ratings: RatingCycle,
    trial: usize,
    saved: Option<Saved>,
}

impl ManualController {
    pub fn new(session: Arc<dyn SessionSink>) -> Self {
        Self {
            session,
            ratings: RatingCycle::default(),
            trial: 0,
            saved: None,
        }
    }

    fn step_rate(&self, ctx: &AppContext, sign: f64) {
        let current = ctx.shared.snapshot().master_rate_hz;
        let s = ctx.set_packet_rate(current + sign * ctx.config.rate.step_hz);
        info!("packet rate {:.0} Hz", s.master_rate_hz);
    }
}

impl ExperimentController for ManualController {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn up_key(&mut self, ctx: &AppContext) {
        self.step_rate(ctx, 1.0);
    }

    fn down_key(&mut self, ctx: &AppContext) {
        self.step_rate(ctx, -1.0);
    }

    fn left_key(&mut self, ctx: &AppContext) {
        let d = ctx.link.decrease_delay(ctx.config.link.delay_step());
        info!("link delay {:.1} ms", as_millis(d));
    }

    fn right_key(&mut self, ctx: &AppContext) {
        let d = ctx.link.increase_delay(ctx.config.link.delay_step());
        info!("link delay {:.1} ms", as_millis(d));
    }

    fn next_algorithm(&mut self, ctx: &AppContext) {
        let next = ctx.shared.snapshot().algorithm.next();
        ctx.select_algorithm(next);
        info!("algorithm: {}", next.label());
    }

    fn toggle_reference(&mut self, ctx: &AppContext) {
        match self.saved.take() {
            Some(saved) => {
                ctx.shared.update(|s| {
                    s.reference_mode = false;
                    s.algorithm = saved.algorithm;
                });
                ctx.set_packet_rate(saved.rate_hz);
                ctx.link.set_base_delay(saved.delay);
                info!("reference off");
            }
            None => {
                let state = ctx.shared.snapshot();
                self.saved = Some(Saved {
                    algorithm: state.algorithm,
                    rate_hz: state.master_rate_hz,
                    delay: ctx.link.profile().base_delay,
                });
                ctx.shared.update(|s| {
                    s.reference_mode = true;
                    s.algorithm = Algorithm::None;
                });
                ctx.set_packet_rate(ctx.config.rate.reference_hz);
                ctx.link.set_base_delay(Duration::ZERO);
                info!("reference on");
            }
        }
    }

    fn rate(&mut self, ctx: &AppContext, rating: i32) {
        let state = ctx.shared.snapshot();
        let kind = self.ratings.advance();
        self.session.record_trial(TrialRecord {
            trial: self.trial,
            algorithm: state.algorithm,
            spring: state.spring_index,
            packet_rate_hz: state.master_rate_hz,
            delay_ms: as_millis(ctx.link.profile().base_delay),
            rating_kind: kind,
            rating,
        });
        info!("rated {kind:?} = {rating}");
    }

    fn save(&mut self, _ctx: &AppContext) -> bool {
        self.trial += 1;
        self.ratings.reset();
        info!("manual trial {} started", self.trial);
        false
    }
}
