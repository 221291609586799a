use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::{
    hint::black_box,
    time::{Duration, Instant},
};

use haptic_teleop::{
    Vector3,
    network::{channel::DelayChannel, message::CommandMessage},
};

fn command(seq: i64) -> CommandMessage {
    CommandMessage {
        sequence_number: seq,
        spring: 0,
        position: Vector3::new(0.0, -0.08, 0.0),
        velocity: Vector3::new(0.0, 0.01, 0.0),
    }
}

/// One send plus one poll: the per-tick cost on an ideal link.
fn bench_send_receive(c: &mut Criterion) {
    let ch = DelayChannel::new();
    let t0 = Instant::now();
    let mut seq = 0;

    c.bench_function("channel_send_then_receive", |b| {
        b.iter(|| {
            ch.send_at(command(seq), Duration::ZERO, t0);
            seq += 1;
            black_box(ch.try_receive_at(black_box(t0)))
        })
    });
}

/// Poll that drains a backlog, as after a delay step-down.
fn bench_drain_backlog(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_drain_backlog");
    let t0 = Instant::now();

    for backlog in [10usize, 100, 1_000] {
        group.bench_function(format!("backlog_{backlog}"), |b| {
            b.iter_batched(
                || {
                    let ch = DelayChannel::new();
                    for i in 0..backlog {
                        ch.send_at(command(i as i64), Duration::from_micros(i as u64), t0);
                    }
                    ch
                },
                |ch| black_box(ch.try_receive_at(t0 + Duration::from_secs(1))),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

/// Poll while nothing is due yet.
fn bench_poll_not_due(c: &mut Criterion) {
    let ch = DelayChannel::new();
    let t0 = Instant::now();
    for i in 0..50 {
        ch.send_at(command(i), Duration::from_millis(50), t0);
    }

    c.bench_function("channel_poll_not_due", |b| {
        b.iter(|| black_box(ch.try_receive_at(black_box(t0))))
    });
}

criterion_group!(benches, bench_send_receive, bench_drain_backlog, bench_poll_not_due);
criterion_main!(benches);
