//! # Selection Benchmarks
//!
//! Performance benchmarks for cutflow-core selection passes.
//!
//! Run with: `cargo bench -p cutflow-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use cutflow_core::{
    Collection, CutflowAccumulator, EventBatch, Mask, ROOT_STEP, Snapshot, StepGraph, Values,
    select_objects,
};
use std::hint::black_box;

/// Deterministic pseudo-random mask (xorshift) keeping roughly `keep` of 8.
fn pseudo_mask(n: usize, seed: u64, keep: u64) -> Vec<bool> {
    let mut state = seed.max(1);
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state % 8 < keep
        })
        .collect()
}

/// Batch of `size` events with two muons each.
fn create_batch(size: usize) -> EventBatch {
    let pt: Vec<f64> = (0..2 * size).map(|i| (i % 97) as f64).collect();
    let muons = Collection::from_counts(&vec![2; size])
        .with_field("pt", Values::Float(pt))
        .expect("pt");
    EventBatch::new(size)
        .with_scalar("w", Values::Float(vec![1.5; size]))
        .expect("w")
        .with_collection("Muon", muons)
        .expect("Muon")
}

/// Five chained steps, the last one split into two channels.
fn create_graph(size: usize) -> StepGraph {
    let mut graph = StepGraph::init(size);
    let mut parent = ROOT_STEP.to_string();
    for (i, label) in ["met", "trigger", "vertex", "lepton"].iter().enumerate() {
        graph
            .declare_step(label, Mask::Simple(pseudo_mask(size, i as u64 + 1, 7)), &parent)
            .expect("step");
        parent = label.to_string();
    }
    graph
        .declare_step(
            "channel",
            Mask::categorized([
                ("ee", pseudo_mask(size, 11, 3)),
                ("mumu", pseudo_mask(size, 13, 3)),
            ]),
            &parent,
        )
        .expect("channel");
    graph
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_declare_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("declare_steps");

    for size in [1_000, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(create_graph(size)));
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [1_000, 10_000, 100_000].iter() {
        let batch = create_batch(*size);
        let graph = create_graph(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(Snapshot::capture("bench", &batch, &graph, "channel", None)));
        });
    }

    group.finish();
}

fn bench_cutflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("cutflow");

    for size in [1_000, 10_000, 100_000].iter() {
        let graph = create_graph(*size);
        let weights = vec![1.5; *size];

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut acc = CutflowAccumulator::new();
                for step in graph.steps() {
                    let _ = acc.record(step, Some(weights.as_slice()));
                }
                black_box(acc.finish())
            });
        });
    }

    group.finish();
}

fn bench_object_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_selection");

    for size in [1_000, 10_000, 100_000].iter() {
        let batch = create_batch(*size);
        let keep = pseudo_mask(2 * size, 5, 4);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(select_objects(batch.clone(), "Muon", &keep)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_declare_steps,
    bench_snapshot,
    bench_cutflow,
    bench_object_selection,
);
criterion_main!(benches);
