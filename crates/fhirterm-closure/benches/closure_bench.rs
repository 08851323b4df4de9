//! Closure rebuild and set algebra at hierarchy scale.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fhirterm_closure::{
    ClosureBuilder, ClosureConfig, ConceptSet, IsAEdge, IsAGraph, MemoryStore, TraversalStrategy,
};

/// Balanced tree with the given fan-out and depth; ids are assigned breadth-first from 1.
fn tree_edges(fan_out: u64, depth: u32) -> Vec<IsAEdge> {
    let mut edges = Vec::new();
    let mut level = vec![1u64];
    let mut next_id = 2u64;
    for _ in 0..depth {
        let mut next_level = Vec::with_capacity(level.len() * fan_out as usize);
        for &parent in &level {
            for _ in 0..fan_out {
                edges.push(IsAEdge::new(next_id, parent));
                next_level.push(next_id);
                next_id += 1;
            }
        }
        level = next_level;
    }
    edges
}

fn bench_intersect(c: &mut Criterion) {
    let mut group = c.benchmark_group("concept_set_intersect");
    for size in [1_000u64, 100_000, 350_000] {
        let large: ConceptSet = (0..size).collect();
        let small: ConceptSet = (0..size).step_by(7).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(large.intersect(&small)))
        });
    }
    group.finish();
}

fn bench_descendants(c: &mut Criterion) {
    let graph = IsAGraph::from_edges(tree_edges(8, 5));
    c.bench_function("graph_descendants_root", |b| {
        b.iter(|| black_box(graph.descendants(1)))
    });
}

fn bench_rebuild(c: &mut Criterion) {
    let edges = tree_edges(6, 4);
    let mut group = c.benchmark_group("closure_rebuild");
    group.sample_size(10);
    for traversal in [TraversalStrategy::StoreQuery, TraversalStrategy::InMemory] {
        group.bench_function(format!("{:?}", traversal), |b| {
            let store = MemoryStore::with_edges(edges.iter().copied());
            let builder = ClosureBuilder::with_config(
                ClosureConfig::builder()
                    .with_batch_size(500)
                    .with_traversal(traversal)
                    .build(),
            );
            b.iter(|| black_box(builder.rebuild(&store).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_intersect, bench_descendants, bench_rebuild);
criterion_main!(benches);
