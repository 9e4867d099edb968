//! # Propagation Benchmark
//!
//! Measures the cost of a single leaf mutation in a large, fully validated
//! tree. Propagation should scale with the touched path, not the tree size.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use canopy_core::{Axes, NodeId, Primitive, SceneTree};
use glam::Vec2;

/// Builds `groups` auto-sized containers with `per_group` leaves each.
fn build(groups: usize, per_group: usize) -> (SceneTree, Vec<NodeId>) {
    let mut tree = SceneTree::new();
    let root = tree.root();
    let mut leaves = Vec::with_capacity(groups * per_group);

    for g in 0..groups {
        let group = tree.create_container().expect("container");
        tree.attach(root, group).expect("attach group");
        tree.set_auto_size_axes(group, Axes::BOTH).expect("auto");
        tree.set_position(group, Vec2::new(g as f32 * 4.0, 0.0)).expect("position");
        for i in 0..per_group {
            let leaf = tree.create_leaf(Primitive::solid_quad()).expect("leaf");
            tree.attach(group, leaf).expect("attach leaf");
            tree.set_size(leaf, Vec2::new(2.0, 2.0)).expect("size");
            tree.set_position(leaf, Vec2::new(0.0, i as f32 * 2.0)).expect("position");
            leaves.push(leaf);
        }
    }

    validate_all(&mut tree);
    (tree, leaves)
}

fn validate_all(tree: &mut SceneTree) {
    let ids: Vec<NodeId> = tree.depth_first(tree.root()).collect();
    for id in ids {
        let _ = tree.draw_state(id);
    }
}

/// One leaf resize followed by the reads that revalidate its path.
fn bench_leaf_resize(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaf_resize");

    for groups in [10, 100, 1_000] {
        let (mut tree, leaves) = build(groups, 10);
        let target = leaves[leaves.len() / 2];
        let mut flip = false;

        group.bench_with_input(BenchmarkId::new("groups", groups), &groups, |b, _| {
            b.iter(|| {
                flip = !flip;
                let side = if flip { 3.0 } else { 2.0 };
                let _ = tree.set_size(target, Vec2::splat(side));
                black_box(tree.draw_state(target).ok());
            });
        });
    }

    group.finish();
}

/// Colour change on a container: the whole subtree is touched once.
fn bench_subtree_colour(c: &mut Criterion) {
    let mut group = c.benchmark_group("subtree_colour");

    for per_group in [10, 100, 1_000] {
        let (mut tree, _) = build(4, per_group);
        let target = tree.children(tree.root()).map(|c| c[0]).expect("group");
        let mut alpha = 1.0_f32;

        group.bench_with_input(BenchmarkId::new("leaves", per_group), &per_group, |b, _| {
            b.iter(|| {
                alpha = if alpha > 0.5 { 0.25 } else { 1.0 };
                let _ = tree.set_alpha(target, alpha);
                validate_all(&mut tree);
            });
        });
    }

    group.finish();
}

/// Repeated invalidation of an already stale subtree must stay flat.
fn bench_redundant_invalidation(c: &mut Criterion) {
    let (mut tree, leaves) = build(100, 10);
    let target = leaves[0];
    let _ = tree.set_size(target, Vec2::splat(9.0));

    c.bench_function("redundant_invalidation", |b| {
        b.iter(|| {
            black_box(tree.set_position(target, Vec2::splat(1.0)).ok());
            black_box(tree.set_position(target, Vec2::splat(0.0)).ok());
        });
    });
}

criterion_group!(
    benches,
    bench_leaf_resize,
    bench_subtree_colour,
    bench_redundant_invalidation,
);
criterion_main!(benches);
