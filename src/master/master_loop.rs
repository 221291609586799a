//! master_loop.rs
//! Per-tick driver for the master node.
//! - samples the device and zeroes the unconstrained axes
//! - every tick builds a command; the governor (and deadband, if enabled) gate sending
//! - feedback built for another spring is dropped unread
//! - feedback is decoded, clamped to the force limit and held until the next packet
//! - the device receives a force every tick: the held output, or zero with feedback off

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::{
    Vector3,
    context::{AppContext, SharedState},
    master::device::{HapticDevice, limit_force},
    network::{
        deadband::CommandDeadband,
        governor::PacketRateGovernor,
        message::{CONSTRAINED_AXIS, CommandMessage, Node, constrain},
    },
    slave::contact::ContactModel,
    stability::{Algorithm, MasterTransform},
    telemetry::{TelemetryFrame, VisualizationSurface},
    utils::{
        metrics::LoopStats,
        session::{SessionSink, StateRecord},
    },
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterTick {
    pub position: Vector3,
    pub velocity: Vector3,
    /// Force handed to the device this tick.
    pub force: Vector3,
    pub sent: bool,
    pub received: bool,
}

pub struct MasterLoop {
    ctx: Arc<AppContext>,
    device: Box<dyn HapticDevice>,
    spring: ContactModel,
    transform: MasterTransform,
    governor: PacketRateGovernor,
    deadband: Option<CommandDeadband>,
    applied: (Algorithm, usize),
    held_force: Vector3,
    sequence: i64,
    max_force: f64,
    dt: f64,
    started: Instant,
    session: Arc<dyn SessionSink>,
    surface: Arc<dyn VisualizationSurface>,
    stats: LoopStats,
}

impl MasterLoop {
    /// The device must already be open and calibrated.
    pub fn new(
        ctx: Arc<AppContext>,
        device: Box<dyn HapticDevice>,
        session: Arc<dyn SessionSink>,
        surface: Arc<dyn VisualizationSurface>,
    ) -> Self {
        let cfg = &ctx.config;
        let state = ctx.shared.snapshot();
        let dt = cfg.timing.dt();
        let spring = ctx.spring(state.spring_index);

        Self {
            device,
            spring,
            transform: build_transform(&ctx, state.algorithm, &spring, dt),
            governor: PacketRateGovernor::new(state.master_rate_hz),
            deadband: cfg
                .master
                .deadband
                .map(|t| CommandDeadband::new(t, cfg.master.position_deadband)),
            applied: (state.algorithm, state.spring_index),
            held_force: Vector3::zeros(),
            sequence: 0,
            max_force: cfg.max_force,
            dt,
            started: Instant::now(),
            session,
            surface,
            stats: LoopStats::new(Node::Master, cfg.timing.period()),
            ctx,
        }
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Hand back the device (for closing) and the loop statistics.
    pub fn into_parts(self) -> (Box<dyn HapticDevice>, LoopStats) {
        (self.device, self.stats)
    }

    fn sync_state(&mut self, state: &SharedState, now: Instant) {
        let wanted = (state.algorithm, state.spring_index);
        if wanted != self.applied {
            self.spring = self.ctx.spring(state.spring_index);
            self.transform = build_transform(&self.ctx, state.algorithm, &self.spring, self.dt);
            self.held_force = Vector3::zeros();
            if let Some(db) = self.deadband.as_mut() {
                db.reset();
            }
            self.applied = wanted;
            debug!(
                "[master] reconfigured: algorithm={} spring={}",
                state.algorithm, state.spring_index
            );
        }

        if state.master_rate_hz != self.governor.rate() {
            self.governor.set_rate_at(state.master_rate_hz, now);
            debug!("[master] packet rate re-armed at {} Hz", state.master_rate_hz);
        }
    }

    pub fn tick_at(&mut self, now: Instant) -> MasterTick {
        let state = self.ctx.shared.snapshot();
        self.sync_state(&state, now);

        let position = constrain(self.device.position());
        let velocity = constrain(self.device.linear_velocity());

        let command = CommandMessage {
            sequence_number: self.sequence,
            spring: self.applied.1,
            position,
            velocity: self.transform.encode_outgoing(&position, &velocity),
        };
        self.sequence += 1;

        // a suppressed sample must not spend a token
        let changed = self
            .deadband
            .as_ref()
            .is_none_or(|db| db.changed(&position, &velocity));
        let sent = changed && self.governor.permitted_at(now);
        if sent {
            if let Some(db) = self.deadband.as_mut() {
                db.commit(&position, &velocity);
            }
            self.ctx.link.send_command_at(command, now);
        }

        let spring_index = self.applied.1;
        let received = match self.ctx.link.try_receive_feedback_at(now) {
            Some(msg) if msg.spring == spring_index => {
                let force = self.transform.decode_incoming(&msg, &position, &velocity);
                self.held_force = limit_force(force, self.max_force);
                true
            }
            stale => {
                if let Some(msg) = stale {
                    debug!(
                        "[master] dropped feedback {} for spring {}",
                        msg.sequence_number, msg.spring
                    );
                }
                if let Some(force) = self.transform.hold_force(&position) {
                    self.held_force = limit_force(force, self.max_force);
                }
                false
            }
        };

        let force = if state.force_feedback {
            self.held_force
        } else {
            Vector3::zeros()
        };
        self.device.set_force(&force);

        self.stats.record_traffic(sent, received);
        self.report(&state, now, &position, &velocity, &force, sent, received);

        MasterTick {
            position,
            velocity,
            force,
            sent,
            received,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        state: &SharedState,
        now: Instant,
        position: &Vector3,
        velocity: &Vector3,
        force: &Vector3,
        sent: bool,
        received: bool,
    ) {
        let axis = CONSTRAINED_AXIS;
        self.session.record_state(StateRecord {
            t_us: now.saturating_duration_since(self.started).as_micros() as u64,
            node: Node::Master,
            sequence: self.sequence - 1,
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
            node: Node::Master,
            position: position[axis],
            force: force[axis],
            indentation: self.spring.indentation(position),
            algorithm: state.algorithm,
            packet_rate_hz: state.master_rate_hz,
            delay_ms: self.ctx.link.profile().base_delay.as_secs_f64() * 1e3,
        });
    }

    pub fn run(&mut self, period: Duration) {
        let ctx = self.ctx.clone();
        crate::runner::spin_periodic(period, &ctx, |now| {
            let started = Instant::now();
            self.stats.record_release(now);
            self.tick_at(now);
            self.stats.record_work(started.elapsed());
        });
        // leave the operator's hand free
        self.device.set_force(&Vector3::zeros());
        debug!("[master] stopped after {} ticks", self.stats.ticks());
    }
}

fn build_transform(
    ctx: &AppContext,
    algorithm: Algorithm,
    spring: &ContactModel,
    dt: f64,
) -> MasterTransform {
    MasterTransform::new(algorithm, &ctx.config.algorithms, spring, dt).unwrap_or_else(|e| {
        warn!("[master] {algorithm} unavailable ({e}), running without compensation");
        MasterTransform::None
    })
}
