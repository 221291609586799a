use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use haptic_teleop::{
    Vector3,
    network::message::{CommandMessage, FeedbackMessage},
    slave::contact::ContactModel,
    stability::{Algorithm, AlgorithmParams, MasterTransform, SlaveTransform},
};

const DT: f64 = 0.001;

/// Full per-tick transform work on both sides of the link.
fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform_round_trip");
    let params = AlgorithmParams::default();
    let spring = ContactModel::default();

    let pos = Vector3::new(0.0, -0.08, 0.0);
    let vel = Vector3::new(0.0, 0.02, 0.0);
    let force = spring.force_at(&pos, &vel);

    for algorithm in Algorithm::ALL {
        group.bench_function(algorithm.label(), |b| {
            let (Ok(mut master), Ok(mut slave)) = (
                MasterTransform::new(algorithm, &params, &spring, DT),
                SlaveTransform::new(algorithm, &params, &spring, DT),
            ) else {
                return;
            };
            let mut seq = 0;
            b.iter(|| {
                let cmd = CommandMessage {
                    sequence_number: seq,
                    spring: 0,
                    position: pos,
                    velocity: master.encode_outgoing(&pos, &vel),
                };
                let vel_ref = slave.decode_incoming(&cmd, &force);
                let payload = slave.encode_outgoing(&force, &pos, &vel_ref);
                let msg = FeedbackMessage {
                    sequence_number: seq,
                    spring: 0,
                    force: payload.force,
                    position: Some(pos),
                    stiffness: payload.stiffness,
                    force_rate: payload.force_rate,
                };
                seq += 1;
                black_box(master.decode_incoming(&msg, &pos, &vel))
            })
        });
    }
    group.finish();
}

fn bench_contact(c: &mut Criterion) {
    let spring = ContactModel::default();
    let pos = Vector3::new(0.0, -0.07, 0.0);
    let vel = Vector3::new(0.0, 0.05, 0.0);
    c.bench_function("contact_force_at", |b| {
        b.iter(|| black_box(spring.force_at(black_box(&pos), black_box(&vel))))
    });
}

criterion_group!(benches, bench_round_trip, bench_contact);
criterion_main!(benches);
