use criterion::{criterion_group, criterion_main, Criterion};
use hv_regulator::{HistoryBuffer, PIDController, PidConfig, Sample, SimulatedPlant, SupplyParams};
use std::time::{Duration, Instant};

fn benchmark_pid_update(c: &mut Criterion) {
    let config = PidConfig {
        sample_interval_ms: 0,
        ..PidConfig::default()
    };
    let mut pid = PIDController::new(&config).expect("default gains are valid");
    pid.set_setpoint(5.0);
    let mut now = Instant::now();
    c.bench_function("pid_update", |b| {
        b.iter(|| {
            now += Duration::from_millis(100);
            pid.update(4.8, now)
        })
    });
}

fn benchmark_history_push(c: &mut Criterion) {
    let history = HistoryBuffer::new(100).expect("non-zero capacity");
    let mut sequence = 0u64;
    c.bench_function("history_push", |b| {
        b.iter(|| {
            sequence += 1;
            history.push(Sample { sequence, setpoint: 5.0, measured: 4.9 });
        })
    });
}

fn benchmark_plant_sample(c: &mut Criterion) {
    let plant = SimulatedPlant::new(42, SupplyParams { noise_amplitude: 0.01, ..SupplyParams::default() });
    c.bench_function("plant_sample", |b| b.iter(|| plant.sample()));
}

criterion_group!(benches, benchmark_pid_update, benchmark_history_push, benchmark_plant_sample);
criterion_main!(benches);
