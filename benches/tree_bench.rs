//! Performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec2;
use leb_cbt::reduction::{compute_sum_reduction, execute_schedule, ReductionSchedule};
use leb_cbt::{DeviceExecutor, HostExecutor, Mode, Subdivision, Tree};

fn refined_tree(max_depth: u32) -> Tree {
    let mut executor = HostExecutor::new(Tree::new(max_depth, 1).expect("tree builds"));
    let subdivision = Subdivision::new(Mode::Triangle, Vec2::new(0.3, 0.2));
    for _ in 0..max_depth {
        subdivision.split_pass(&mut executor);
    }
    executor.into_tree()
}

fn benchmark_split_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_pass");
    for max_depth in [12u32, 16] {
        let tree = refined_tree(max_depth);
        let subdivision = Subdivision::new(Mode::Triangle, Vec2::new(0.31, 0.21));

        group.bench_with_input(BenchmarkId::new("host", max_depth), &tree, |b, tree| {
            b.iter(|| {
                let mut executor = HostExecutor::new(tree.clone());
                black_box(subdivision.split_pass(&mut executor));
            });
        });
        group.bench_with_input(BenchmarkId::new("device", max_depth), &tree, |b, tree| {
            b.iter(|| {
                let mut executor = DeviceExecutor::new(tree.clone(), 1 << 12);
                black_box(subdivision.split_pass(&mut executor));
            });
        });
    }
    group.finish();
}

fn benchmark_reduction(c: &mut Criterion) {
    let mut group = c.benchmark_group("sum_reduction");
    for max_depth in [16u32, 20] {
        let tree = Tree::new(max_depth, max_depth - 2).expect("tree builds");
        let schedule = ReductionSchedule::new(max_depth, 1 << 14);

        group.bench_with_input(BenchmarkId::new("full", max_depth), &tree, |b, tree| {
            b.iter(|| {
                let mut heap = leb_cbt::BitHeap::from_words(tree.heap_words().to_vec());
                compute_sum_reduction(&mut heap, max_depth);
                black_box(heap);
            });
        });
        group.bench_with_input(BenchmarkId::new("scheduled", max_depth), &tree, |b, tree| {
            b.iter(|| {
                let mut heap = leb_cbt::BitHeap::from_words(tree.heap_words().to_vec());
                execute_schedule(&mut heap, &schedule);
                black_box(heap);
            });
        });
    }
    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let tree = refined_tree(16);
    let count = tree.node_count();

    c.bench_function("decode_all_handles", |b| {
        b.iter(|| {
            for handle in 0..count {
                black_box(tree.decode_node(handle).expect("handle in range"));
            }
        });
    });
    c.bench_function("leaf_iteration", |b| {
        b.iter(|| black_box(tree.leaves().count()));
    });
}

criterion_group!(
    benches,
    benchmark_split_pass,
    benchmark_reduction,
    benchmark_decode
);
criterion_main!(benches);
