//! slave_loop.rs
//! Per-tick driver for the slave node.
//! - contact force is computed from the state the tick starts in
//! - a missing command holds the last reference (zero-order hold)
//! - commands built for another spring are dropped unread
//! - transform state is rebuilt whenever algorithm or spring changes
//! - the packet governor is re-armed whenever the configured rate changes

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::{
    Vector3,
    context::{AppContext, SharedState},
    network::{
        governor::PacketRateGovernor,
        message::{CONSTRAINED_AXIS, FeedbackMessage, Node},
    },
    slave::{SlaveModel, contact::ContactModel},
    stability::{Algorithm, SlaveTransform},
    telemetry::{TelemetryFrame, VisualizationSurface},
    utils::{
        metrics::LoopStats,
        session::{SessionSink, StateRecord},
    },
};

/// What happened during one slave tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaveTick {
    pub position: Vector3,
    pub velocity: Vector3,
    pub contact_force: Vector3,
    pub indentation: f64,
    pub received: bool,
    pub sent: bool,
}

/// Per-tick values handed to the session store and the telemetry surface.
/// `sequence` is the number this tick's feedback carries, or would have carried.
#[derive(Debug, Clone, Copy)]
struct SlaveSample {
    sequence: i64,
    position: Vector3,
    velocity: Vector3,
    force: Vector3,
    indentation: f64,
    sent: bool,
    received: bool,
}

pub struct SlaveLoop {
    ctx: Arc<AppContext>,
    model: SlaveModel,
    spring: ContactModel,
    transform: SlaveTransform,
    governor: PacketRateGovernor,
    applied: (Algorithm, usize),
    pos_ref: Vector3,
    vel_ref: Vector3,
    sequence: i64,
    dt: f64,
    started: Instant,
    session: Arc<dyn SessionSink>,
    surface: Arc<dyn VisualizationSurface>,
    stats: LoopStats,
}

impl SlaveLoop {
    pub fn new(
        ctx: Arc<AppContext>,
        session: Arc<dyn SessionSink>,
        surface: Arc<dyn VisualizationSurface>,
    ) -> Self {
        let cfg = &ctx.config;
        let state = ctx.shared.snapshot();
        let dt = cfg.timing.dt();
        let spring = ctx.spring(state.spring_index);

        // rest pose: hovering just above the surface
        let start = Vector3::new(0.0, spring.rest_position - spring.length * 0.25, 0.0);
        let model = SlaveModel::new(cfg.slave.mass, cfg.slave.damping, cfg.slave.tracker)
            .with_state(start, Vector3::zeros());

        let transform = build_transform(&ctx, state.algorithm, &spring, dt);
        let governor = PacketRateGovernor::new(state.slave_rate_hz);
        let stats = LoopStats::new(Node::Slave, cfg.timing.period());

        Self {
            model,
            spring,
            transform,
            governor,
            applied: (state.algorithm, state.spring_index),
            pos_ref: start,
            vel_ref: Vector3::zeros(),
            sequence: 0,
            dt,
            started: Instant::now(),
            session,
            surface,
            stats,
            ctx,
        }
    }

    pub fn model(&self) -> &SlaveModel {
        &self.model
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn into_stats(self) -> LoopStats {
        self.stats
    }

    /// Rebuild per-configuration state when the controller changed something.
    fn sync_state(&mut self, state: &SharedState, now: Instant) {
        let wanted = (state.algorithm, state.spring_index);
        if wanted != self.applied {
            self.spring = self.ctx.spring(state.spring_index);
            self.transform = build_transform(&self.ctx, state.algorithm, &self.spring, self.dt);
            self.model.reset_tracker();
            self.applied = wanted;
            debug!(
                "[slave] reconfigured: algorithm={} spring={}",
                state.algorithm, state.spring_index
            );
        }

        if state.slave_rate_hz != self.governor.rate() {
            self.governor.set_rate_at(state.slave_rate_hz, now);
            debug!("[slave] packet rate re-armed at {} Hz", state.slave_rate_hz);
        }
    }

    pub fn tick_at(&mut self, now: Instant) -> SlaveTick {
        let state = self.ctx.shared.snapshot();
        self.sync_state(&state, now);

        let position = self.model.position();
        let velocity = self.model.velocity();
        let contact_force = self.spring.force_at(&position, &velocity);
        let indentation = self.spring.indentation(&position);

        let spring_index = self.applied.1;
        let received = match self.ctx.link.try_receive_command_at(now) {
            Some(cmd) if cmd.spring == spring_index => {
                self.pos_ref = cmd.position;
                self.vel_ref = self.transform.decode_incoming(&cmd, &contact_force);
                true
            }
            Some(cmd) => {
                debug!(
                    "[slave] dropped command {} for spring {}",
                    cmd.sequence_number, cmd.spring
                );
                false
            }
            None => false,
        };

        self.model
            .step(&self.pos_ref, &self.vel_ref, &contact_force, self.dt);

        let payload = self
            .transform
            .encode_outgoing(&contact_force, &position, &velocity);

        let sequence = self.sequence;
        let sent = self.governor.permitted_at(now);
        if sent {
            self.ctx.link.send_feedback_at(
                FeedbackMessage {
                    sequence_number: sequence,
                    spring: spring_index,
                    force: payload.force,
                    position: Some(position),
                    stiffness: payload.stiffness,
                    force_rate: payload.force_rate,
                },
                now,
            );
            self.sequence += 1;
        }

        self.stats.record_traffic(sent, received);
        let sample = SlaveSample {
            sequence,
            position,
            velocity,
            force: contact_force,
            indentation,
            sent,
            received,
        };
        self.report(&state, now, &sample);

        SlaveTick {
            position,
            velocity,
            contact_force,
            indentation,
            received,
            sent,
        }
    }

    fn report(&self, state: &SharedState, now: Instant, sample: &SlaveSample) {
        let axis = CONSTRAINED_AXIS;
        let SlaveSample {
            sequence,
            position,
            velocity,
            force,
            indentation,
            sent,
            received,
        } = *sample;
        self.session.record_state(StateRecord {
            t_us: now.saturating_duration_since(self.started).as_micros() as u64,
            node: Node::Slave,
            sequence,
            position: position[axis],
            velocity: velocity[axis],
            force: force[axis],
            sent,
            received,
            reference: state.reference_mode,
            algorithm: state.algorithm,
            spring: state.spring_index,
        });
        self.surface.publish(TelemetryFrame {
            node: Node::Slave,
            position: position[axis],
            force: force[axis],
            indentation,
            algorithm: state.algorithm,
            packet_rate_hz: state.slave_rate_hz,
            delay_ms: self.ctx.link.profile().base_delay.as_secs_f64() * 1e3,
        });
    }

    /// Periodic driver; returns when the running flag clears.
    pub fn run(&mut self, period: Duration) {
        let ctx = self.ctx.clone();
        crate::runner::spin_periodic(period, &ctx, |now| {
            let started = Instant::now();
            self.stats.record_release(now);
            self.tick_at(now);
            self.stats.record_work(started.elapsed());
        });
        debug!("[slave] stopped after {} ticks", self.stats.ticks());
    }
}

fn build_transform(
    ctx: &AppContext,
    algorithm: Algorithm,
    spring: &ContactModel,
    dt: f64,
) -> SlaveTransform {
    SlaveTransform::new(algorithm, &ctx.config.algorithms, spring, dt).unwrap_or_else(|e| {
        warn!("[slave] {algorithm} unavailable ({e}), running without compensation");
        SlaveTransform::None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::TeleopConfig,
        network::message::CommandMessage,
        telemetry::NullSurface,
        utils::session::{NullSession, TrialRecord},
    };
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorded(Mutex<Vec<StateRecord>>);

    impl SessionSink for Recorded {
        fn record_state(&self, record: StateRecord) {
            self.0.lock().push(record);
        }
        fn record_trial(&self, _record: TrialRecord) {}
    }

    fn y(v: f64) -> Vector3 {
        Vector3::new(0.0, v, 0.0)
    }

    fn slave(ctx: &Arc<AppContext>) -> SlaveLoop {
        SlaveLoop::new(ctx.clone(), Arc::new(NullSession), Arc::new(NullSurface))
    }

    fn command(seq: i64, pos: f64) -> CommandMessage {
        CommandMessage {
            sequence_number: seq,
            spring: 0,
            position: y(pos),
            velocity: Vector3::zeros(),
        }
    }

    #[test]
    fn holds_reference_without_commands() {
        let ctx = AppContext::new(TeleopConfig::default());
        let mut s = slave(&ctx);
        let t0 = Instant::now();

        ctx.link.send_command_at(command(0, -0.2), t0);
        assert!(s.tick_at(t0).received);

        let mut t = t0;
        for _ in 0..3_000 {
            t += Duration::from_millis(1);
            assert!(!s.tick_at(t).received);
        }
        assert!((s.model().position().y + 0.2).abs() < 1e-3);
    }

    #[test]
    fn feedback_carries_contact_force_and_position() {
        let ctx = AppContext::new(TeleopConfig::default());
        let mut s = slave(&ctx);
        let t0 = Instant::now();

        // push well into the spring and let it settle
        ctx.link.send_command_at(command(0, -0.05), t0);
        let mut t = t0;
        let mut last = s.tick_at(t);
        for _ in 0..3_000 {
            t += Duration::from_millis(1);
            last = s.tick_at(t);
        }
        assert!(last.indentation > 0.0);
        assert!(last.contact_force.y < 0.0);

        let fb = ctx.link.try_receive_feedback_at(t).unwrap();
        assert_eq!(fb.force, last.contact_force);
        assert_eq!(fb.position, Some(last.position));
        assert_eq!(fb.stiffness, None);
    }

    #[test]
    fn rate_change_rearms_governor() {
        let ctx = AppContext::new(TeleopConfig::default());
        let mut s = slave(&ctx);
        let t0 = Instant::now();
        s.tick_at(t0);

        ctx.set_packet_rate(10.0);
        let mut sent = 0;
        let mut t = t0;
        // the fresh burst of 10 goes out first, then ~10 per second
        for _ in 0..2_000 {
            t += Duration::from_millis(1);
            sent += u32::from(s.tick_at(t).sent);
        }
        assert!((29..=31).contains(&sent), "sent {sent}");
    }

    #[test]
    fn mmt_feedback_carries_stiffness_estimate() {
        let ctx = AppContext::new(TeleopConfig::default());
        ctx.select_algorithm(Algorithm::ModelMediated);
        let mut s = slave(&ctx);
        let t0 = Instant::now();
        s.tick_at(t0);
        let fb = ctx.link.try_receive_feedback_at(t0).unwrap();
        assert!(fb.stiffness.is_some());
    }

    #[test]
    fn commands_for_another_spring_are_dropped() {
        let ctx = AppContext::new(TeleopConfig::default());
        let mut s = slave(&ctx);
        let t0 = Instant::now();
        s.tick_at(t0);

        // a master that read its snapshot before the switch sends after the flush
        ctx.select_spring(2);
        ctx.link.send_command_at(command(7, -0.2), t0);
        let tick = s.tick_at(t0 + Duration::from_millis(1));
        assert!(!tick.received);

        ctx.link.send_command_at(
            CommandMessage {
                spring: 2,
                ..command(8, -0.2)
            },
            t0,
        );
        assert!(s.tick_at(t0 + Duration::from_millis(2)).received);

        let fb = ctx
            .link
            .try_receive_feedback_at(t0 + Duration::from_millis(2))
            .unwrap();
        assert_eq!(fb.spring, 2);
    }

    #[test]
    fn session_records_the_sequence_of_the_ticks_own_feedback() {
        let ctx = AppContext::new(TeleopConfig::default());
        let session = Arc::new(Recorded::default());
        let mut s = SlaveLoop::new(ctx.clone(), session.clone(), Arc::new(NullSurface));
        let t0 = Instant::now();

        let mut sent = Vec::new();
        for i in 0..3 {
            let t = t0 + Duration::from_millis(i);
            s.tick_at(t);
            sent.push(ctx.link.try_receive_feedback_at(t).unwrap().sequence_number);
        }

        let recorded: Vec<i64> = session.0.lock().iter().map(|r| r.sequence).collect();
        assert_eq!(sent, vec![0, 1, 2]);
        assert_eq!(recorded, sent);
    }

    #[test]
    fn run_returns_once_stopped() {
        let ctx = AppContext::new(TeleopConfig::default());
        let mut s = slave(&ctx);
        let stopper = {
            let ctx = ctx.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                ctx.stop();
            })
        };
        s.run(Duration::from_millis(1));
        stopper.join().unwrap();
        assert!(s.stats().ticks() > 0);
    }
}
