use std::time::Duration;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use lockstep_core::velocity::VelocityEstimator;
use lockstep_core::{
    AxisInput, Command, ControlInput, ControllerParameters, CoordinatorBuilder, Decimal,
    PositionController,
};
use lockstep_hardware::SimPlant;
use lockstep_traits::Axis;
use lockstep_traits::clock::test_clock::TestClock;

fn bench_compute(c: &mut Criterion) {
    let ctl = PositionController::new(Decimal::new(5, 2), 6);
    let input = ControlInput {
        a: AxisInput {
            target: 1_000,
            actual: 990,
            feed_forward: Decimal::new(500_000, 6),
            limit: Decimal::ONE,
        },
        b: AxisInput {
            target: -1_000,
            actual: -1_013,
            feed_forward: Decimal::new(-500_000, 6),
            limit: Decimal::ONE,
        },
    };
    c.bench_function("controller_compute", |b| {
        b.iter(|| black_box(ctl.compute(black_box(&input))))
    });
}

fn bench_estimator(c: &mut Criterion) {
    let cycle = Decimal::new(10_000, 6);
    c.bench_function("velocity_update_window", |b| {
        b.iter_batched(
            || VelocityEstimator::new(6),
            |mut est| {
                for i in 0..40 {
                    black_box(est.update(Axis::A, cycle, i % 3));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_tick(c: &mut Criterion) {
    c.bench_function("coordinator_tick_sim", |b| {
        b.iter_batched(
            || {
                let plant = SimPlant::new(4);
                let clock = TestClock::new();
                let params = ControllerParameters {
                    gain: Decimal::new(5, 2),
                    limits: [Decimal::ONE; 2],
                    closed_loop: true,
                    velocity: [Decimal::from_int(55); 2],
                    ..ControllerParameters::default()
                };
                let mut coord = CoordinatorBuilder::new()
                    .with_peer(plant.peer())
                    .with_sink(plant.sink())
                    .with_clock(Box::new(clock.clone()))
                    .with_params(params)
                    .build()
                    .expect("valid params");
                coord.apply(Command::Start).expect("start");
                (coord, clock)
            },
            |(mut coord, clock)| {
                for _ in 0..100 {
                    clock.advance(Duration::from_millis(10));
                    black_box(coord.on_tick());
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_compute, bench_estimator, bench_tick);
criterion_main!(benches);
