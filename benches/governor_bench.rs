use criterion::{Criterion, criterion_group, criterion_main};
use std::{
    hint::black_box,
    time::{Duration, Instant},
};

use haptic_teleop::network::{deadband::CommandDeadband, governor::PacketRateGovernor};
use haptic_teleop::Vector3;

fn bench_permitted(c: &mut Criterion) {
    let mut group = c.benchmark_group("governor_permitted");
    let t0 = Instant::now();

    for rate in [10.0, 100.0, 1_000.0] {
        group.bench_function(format!("rate_{rate}"), |b| {
            let mut gov = PacketRateGovernor::new_at(rate, t0);
            let mut now = t0;
            b.iter(|| {
                now += Duration::from_micros(1_000);
                black_box(gov.permitted_at(now))
            })
        });
    }
    group.finish();
}

fn bench_deadband(c: &mut Criterion) {
    let mut db = CommandDeadband::new(0.1, 5e-4);
    let mut p = 0.0;
    let mut v = 0.0;

    c.bench_function("deadband_command_gate", |b| {
        b.iter(|| {
            p += 1e-4;
            v += 1e-3;
            let (pos, vel) = (Vector3::new(0.0, p, 0.0), Vector3::new(0.0, v, 0.0));
            let changed = db.changed(black_box(&pos), black_box(&vel));
            if changed {
                db.commit(&pos, &vel);
            }
            black_box(changed)
        })
    });
}

criterion_group!(benches, bench_permitted, bench_deadband);
criterion_main!(benches);
