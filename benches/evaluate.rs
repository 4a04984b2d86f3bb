//! Benchmarks for candidate evaluation on the built-in simulator.

use std::path::PathBuf;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use signal_tuner::{
    compute::{CandidateEvaluator, Evaluator},
    schema::{Backend, Candidate, ScenarioConfig, TuningConfig},
    sim::{QueueScenario, QueueSimulator, Simulator, launcher_for},
};

fn scenario_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios/j11.json")
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    group.sample_size(20);

    for step_length in [1.0, 0.5, 0.1] {
        let config = TuningConfig {
            horizon: (2000.0 / step_length) as u64,
            scenario: ScenarioConfig {
                backend: Backend::Queue,
                config_path: Some(scenario_path()),
                step_length,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut evaluator = Evaluator::new(&config, launcher_for(Backend::Queue)).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("dt={}", step_length)),
            &step_length,
            |b, _| {
                b.iter(|| evaluator.evaluate(black_box(Candidate::new(40, 35))).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_queue_step(c: &mut Criterion) {
    let scenario = QueueScenario::load(scenario_path()).unwrap();
    let mut sim = QueueSimulator::new(scenario, 0.05).unwrap();
    // Warm up to a loaded network.
    for _ in 0..4000 {
        sim.step().unwrap();
    }

    c.bench_function("queue_step", |b| {
        b.iter(|| {
            sim.step().unwrap();
            black_box(sim.vehicle_ids().unwrap().len())
        });
    });
}

criterion_group!(benches, bench_evaluate, bench_queue_step);
criterion_main!(benches);
