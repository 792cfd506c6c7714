// Benchmark for GCS2 reply parsing and the simulated command interpreter
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use pigcs_rs::gcs::protocol;
use pigcs_rs::simulator::SimulatedController;

fn bench_reply_parsing(c: &mut Criterion) {
    let axes: Vec<String> = (0..64).map(|i| format!("A{i}")).collect();
    let reply = axes
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{a}={}.125000", i))
        .collect::<Vec<_>>()
        .join(" \n");
    c.bench_function("parse 64-axis POS? reply", |b| {
        b.iter(|| {
            let positions = protocol::parse_axis_floats(&reply).unwrap();
            assert_eq!(positions.len(), 64);
        });
    });
    c.bench_function("parse 64-axis motion mask", |b| {
        b.iter(|| {
            let moving = protocol::parse_motion_mask("AAAAAAAAAAAAAAAA", &axes).unwrap();
            assert_eq!(moving.values().filter(|m| **m).count(), 32);
        });
    });
}

fn bench_simulator_commands(c: &mut Criterion) {
    let mut sim = SimulatedController::hexapod();
    sim.set_referenced(true);
    c.bench_function("simulated hexapod VMO?/MOV/POS? cycle", |b| {
        b.iter(|| {
            sim.handle_line("VMO? X 1 Y 1");
            sim.handle_line("MOV X 1 Y 1");
            sim.handle_line("ERR?");
            let reply = sim.handle_line("POS?").unwrap();
            assert!(reply.starts_with("X="));
        });
    });
}

criterion_group!(benches, bench_reply_parsing, bench_simulator_commands);
criterion_main!(benches);
