//! network_resources.rs
//! Paired-spring comparison where packet rate costs latency.
//!
//! Each trial fixes one algorithm and one rate-to-delay coupling. The operator toggles
//! between the two compared springs (up/down), tunes the packet rate of the active
//! spring (left/right) and rates smoothness and delay. Raising the rate raises the link
//! delay through [`RateDelay`], so the operator trades update rate against latency.
//! The reference toggle swaps in the reference profile for side-by-side feel.

use std::{sync::Arc, time::Duration};

use log::{info, warn};

use crate::{
    config::TrialConfig,
    context::AppContext,
    experiment::{ExperimentController, RatingCycle, as_millis},
    network::rate_delay::RateDelay,
    stability::Algorithm,
    utils::session::{RatingKind, SessionSink, TrialRecord},
};

pub struct NetworkResourcesController {
    session: Arc<dyn SessionSink>,
    pending: std::vec::IntoIter<TrialConfig>,
    trial: Option<(usize, TrialConfig)>,
    next_index: usize,
    rate_delay: RateDelay,
    compared: (usize, usize),
    packet_rates: Vec<f64>,
    smoothness: Vec<i32>,
    delay_ratings: Vec<i32>,
    ratings: RatingCycle,
    use_reference: bool,
}

impl NetworkResourcesController {
    pub fn new(ctx: &AppContext, session: Arc<dyn SessionSink>) -> Self {
        let springs = ctx.spring_count().max(1);
        let last = springs - 1;
        let (a, b) = ctx.config.experiment.compared_springs;
        Self {
            session,
            pending: ctx.config.trials().into_iter(),
            trial: None,
            next_index: 0,
            rate_delay: RateDelay::default(),
            compared: (a.min(last), b.min(last)),
            packet_rates: vec![ctx.config.rate.min_hz; springs],
            smoothness: vec![0; springs],
            delay_ratings: vec![0; springs],
            ratings: RatingCycle::default(),
            use_reference: false,
        }
    }

    pub fn current_trial(&self) -> Option<&TrialConfig> {
        self.trial.as_ref().map(|(_, t)| t)
    }

    pub fn packet_rate(&self, spring: usize) -> Option<f64> {
        self.packet_rates.get(spring).copied()
    }

    fn active_spring(&self, ctx: &AppContext) -> usize {
        ctx.shared
            .snapshot()
            .spring_index
            .min(self.packet_rates.len() - 1)
    }

    /// Load the next trial. Returns false when none remain.
    fn next_trial(&mut self, ctx: &AppContext) -> bool {
        let Some(cfg) = self.pending.next() else {
            self.trial = None;
            return false;
        };
        self.rate_delay = cfg.rate_delay.into();
        self.trial = Some((self.next_index, cfg));
        self.next_index += 1;

        self.packet_rates.fill(ctx.config.rate.min_hz);
        self.smoothness.fill(0);
        self.delay_ratings.fill(0);
        self.ratings.reset();

        info!("[network-resources] trial {}: {}", self.next_index - 1, cfg.algorithm.label());
        self.apply(ctx);
        true
    }

    /// Push the active spring's settings (or the reference profile) to the loops.
    fn apply(&mut self, ctx: &AppContext) {
        let Some((_, trial)) = self.trial else {
            return;
        };
        let spring = self.active_spring(ctx);

        let (algorithm, rate, delay) = if self.use_reference {
            (Algorithm::None, ctx.config.rate.reference_hz, Duration::ZERO)
        } else {
            let rate = self.packet_rates[spring];
            (trial.algorithm, rate, self.delay_for(rate))
        };

        let reference = self.use_reference;
        let rate = ctx.config.rate.clamp(rate);
        ctx.shared.update(|s| {
            s.reference_mode = reference;
            s.algorithm = algorithm;
            s.master_rate_hz = rate;
            s.slave_rate_hz = rate;
        });
        let applied = ctx.link.set_base_delay(delay);
        if applied < delay {
            warn!(
                "[network-resources] delay {:.1} ms exceeds the link limit, using {:.1} ms",
                as_millis(delay),
                as_millis(applied)
            );
        }
    }

    fn delay_for(&self, rate_hz: f64) -> Duration {
        self.rate_delay.delay(rate_hz.round().max(0.0) as u32)
    }

    fn step_rate(&mut self, ctx: &AppContext, sign: f64) {
        let spring = self.active_spring(ctx);
        let rate = &mut self.packet_rates[spring];
        *rate = ctx.config.rate.clamp(*rate + sign * ctx.config.rate.step_hz);
        info!("[network-resources] spring {spring} rate {:.0} Hz", *rate);
        self.apply(ctx);
    }

    fn toggle_spring(&mut self, ctx: &AppContext) {
        let (a, b) = self.compared;
        let next = if self.active_spring(ctx) == a { b } else { a };
        ctx.select_spring(next);
        self.apply(ctx);
    }
}

impl ExperimentController for NetworkResourcesController {
    fn name(&self) -> &'static str {
        "network-resources"
    }

    fn init(&mut self, ctx: &AppContext) {
        ctx.select_spring(self.compared.0);
        if !self.next_trial(ctx) {
            warn!("[network-resources] no trials configured");
        }
    }

    fn up_key(&mut self, ctx: &AppContext) {
        self.toggle_spring(ctx);
    }

    fn down_key(&mut self, ctx: &AppContext) {
        self.toggle_spring(ctx);
    }

    fn left_key(&mut self, ctx: &AppContext) {
        self.step_rate(ctx, -1.0);
    }

    fn right_key(&mut self, ctx: &AppContext) {
        self.step_rate(ctx, 1.0);
    }

    fn toggle_reference(&mut self, ctx: &AppContext) {
        self.use_reference = !self.use_reference;
        info!(
            "[network-resources] reference {}",
            if self.use_reference { "on" } else { "off" }
        );
        self.apply(ctx);
    }

    fn rate(&mut self, ctx: &AppContext, rating: i32) {
        let spring = self.active_spring(ctx);
        match self.ratings.advance() {
            RatingKind::Smoothness => self.smoothness[spring] = rating,
            RatingKind::Delay => self.delay_ratings[spring] = rating,
        }
    }

    fn save(&mut self, ctx: &AppContext) -> bool {
        let Some((index, trial)) = self.trial else {
            return true;
        };

        let (a, b) = self.compared;
        for spring in [a, b] {
            let rate = self.packet_rates[spring];
            let delay_ms = as_millis(self.delay_for(rate));
            for (kind, rating) in [
                (RatingKind::Smoothness, self.smoothness[spring]),
                (RatingKind::Delay, self.delay_ratings[spring]),
            ] {
                self.session.record_trial(TrialRecord {
                    trial: index,
                    algorithm: trial.algorithm,
                    spring,
                    packet_rate_hz: rate,
                    delay_ms,
                    rating_kind: kind,
                    rating,
                });
            }
        }

        !self.next_trial(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{RateDelayConfig, TeleopConfig},
        experiment::{Command, Flow, dispatch},
        utils::session::StateRecord,
    };
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Trials(Mutex<Vec<TrialRecord>>);

    impl SessionSink for Trials {
        fn record_state(&self, _record: StateRecord) {}
        fn record_trial(&self, record: TrialRecord) {
            self.0.lock().push(record);
        }
    }

    fn two_trials() -> TeleopConfig {
        let mut cfg = TeleopConfig::default();
        let coupling = RateDelayConfig {
            per_hz_us: 1_000,
            constant_us: 2_000,
        };
        cfg.experiment.trials = vec![
            TrialConfig {
                algorithm: Algorithm::Iss,
                rate_delay: coupling,
            },
            TrialConfig {
                algorithm: Algorithm::Wave,
                rate_delay: coupling,
            },
        ];
        cfg
    }

    fn setup() -> (Arc<AppContext>, Arc<Trials>, NetworkResourcesController) {
        let ctx = AppContext::new(two_trials());
        let trials = Arc::new(Trials::default());
        let mut ctrl = NetworkResourcesController::new(&ctx, trials.clone());
        ctrl.init(&ctx);
        (ctx, trials, ctrl)
    }

    #[test]
    fn init_applies_first_trial() {
        let (ctx, _, ctrl) = setup();
        let s = ctx.shared.snapshot();
        assert_eq!(s.spring_index, 1);
        assert_eq!(s.algorithm, Algorithm::Iss);
        assert_eq!(s.master_rate_hz, 10.0);
        // 10 Hz * 1 ms + 2 ms
        assert_eq!(ctx.link.profile().base_delay, Duration::from_millis(12));
        assert_eq!(ctrl.current_trial().map(|t| t.algorithm), Some(Algorithm::Iss));
    }

    #[test]
    fn rate_steps_are_per_spring_and_cost_delay() {
        let (ctx, _, mut ctrl) = setup();
        dispatch(&mut ctrl, &ctx, Command::Right);
        dispatch(&mut ctrl, &ctx, Command::Right);
        assert_eq!(ctrl.packet_rate(1), Some(30.0));
        assert_eq!(ctx.link.profile().base_delay, Duration::from_millis(32));

        // the other compared spring keeps its own rate
        dispatch(&mut ctrl, &ctx, Command::Down);
        let s = ctx.shared.snapshot();
        assert_eq!(s.spring_index, 3);
        assert_eq!(s.slave_rate_hz, 10.0);

        dispatch(&mut ctrl, &ctx, Command::Left);
        assert_eq!(ctrl.packet_rate(3), Some(10.0));

        dispatch(&mut ctrl, &ctx, Command::Up);
        assert_eq!(ctx.shared.snapshot().spring_index, 1);
        assert_eq!(ctx.shared.snapshot().master_rate_hz, 30.0);
    }

    #[test]
    fn reference_profile_overrides_trial() {
        let (ctx, _, mut ctrl) = setup();
        dispatch(&mut ctrl, &ctx, Command::ToggleReference);
        let s = ctx.shared.snapshot();
        assert!(s.reference_mode);
        assert_eq!(s.algorithm, Algorithm::None);
        assert_eq!(s.master_rate_hz, ctx.config.rate.reference_hz);
        assert_eq!(ctx.link.profile().base_delay, Duration::ZERO);

        dispatch(&mut ctrl, &ctx, Command::ToggleReference);
        assert_eq!(ctx.shared.snapshot().algorithm, Algorithm::Iss);
        assert_eq!(ctx.link.profile().base_delay, Duration::from_millis(12));
    }

    #[test]
    fn save_records_both_springs_and_advances() {
        let (ctx, trials, mut ctrl) = setup();
        dispatch(&mut ctrl, &ctx, Command::Rate(4));
        dispatch(&mut ctrl, &ctx, Command::Rate(2));
        dispatch(&mut ctrl, &ctx, Command::Right);

        assert_eq!(dispatch(&mut ctrl, &ctx, Command::Save), Flow::Continue);
        {
            let records = trials.0.lock();
            assert_eq!(records.len(), 4);
            let first = &records[0];
            assert_eq!((first.trial, first.spring), (0, 1));
            assert_eq!(first.algorithm, Algorithm::Iss);
            assert_eq!(first.packet_rate_hz, 20.0);
            assert_eq!(first.delay_ms, 22.0);
            assert_eq!((first.rating_kind, first.rating), (RatingKind::Smoothness, 4));
            assert_eq!((records[1].rating_kind, records[1].rating), (RatingKind::Delay, 2));
            assert_eq!(records[2].spring, 3);
            assert_eq!(records[2].rating, 0);
        }

        // second trial starts from scratch
        assert_eq!(ctx.shared.snapshot().algorithm, Algorithm::Wave);
        assert_eq!(ctrl.packet_rate(1), Some(10.0));

        assert_eq!(dispatch(&mut ctrl, &ctx, Command::Save), Flow::Finished);
        assert_eq!(trials.0.lock().len(), 8);
    }

    #[test]
    fn default_trials_cover_every_algorithm() {
        let ctx = AppContext::new(TeleopConfig::default());
        let mut ctrl = NetworkResourcesController::new(&ctx, Arc::new(Trials::default()));
        ctrl.init(&ctx);
        let mut seen = vec![ctrl.current_trial().map(|t| t.algorithm)];
        while !ctrl.save(&ctx) {
            seen.push(ctrl.current_trial().map(|t| t.algorithm));
        }
        let expected: Vec<_> = Algorithm::ALL.into_iter().map(Some).collect();
        assert_eq!(seen, expected);
    }
}
