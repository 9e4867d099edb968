//! # Batch Benchmark
//!
//! Measures:
//! 1. Snapshot build with copy-forward vs. a cold cache
//! 2. Draw pass over a recorded device, one texture vs. alternating textures
//!
//! Alternating textures is the worst case: every node spills.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use canopy_core::{PipelineConfig, Primitive, Rect, SceneTree, Telemetry, TextureId};
use canopy_rendering::{RecordingDevice, Renderer, SnapshotBuilder};
use glam::Vec2;

fn sprites(count: usize, textures: u32) -> SceneTree {
    let mut tree = SceneTree::new();
    let root = tree.root();
    for i in 0..count {
        let texture = TextureId(1 + (i as u32 % textures));
        let leaf = tree
            .create_leaf(Primitive::Quad { texture, uv: Rect::UNIT })
            .expect("leaf");
        tree.attach(root, leaf).expect("attach");
        tree.set_size(leaf, Vec2::splat(4.0)).expect("size");
        tree.set_position(leaf, Vec2::new((i % 100) as f32 * 5.0, (i / 100) as f32 * 5.0))
            .expect("position");
    }
    tree
}

fn bench_snapshot_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_build");

    for count in [1_000, 10_000] {
        let mut tree = sprites(count, 1);
        group.throughput(Throughput::Elements(count as u64));

        let mut warm = SnapshotBuilder::default();
        let _ = warm.build(&mut tree, 1, 0.0);
        let mut generation = 1;
        group.bench_with_input(BenchmarkId::new("copy_forward", count), &count, |b, _| {
            b.iter(|| {
                generation += 1;
                black_box(warm.build(&mut tree, generation, 0.0).ok());
            });
        });

        group.bench_with_input(BenchmarkId::new("cold", count), &count, |b, _| {
            b.iter(|| {
                let mut cold = SnapshotBuilder::default();
                black_box(cold.build(&mut tree, 1, 0.0).ok());
            });
        });
    }

    group.finish();
}

fn bench_draw_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("draw_pass");
    let config = PipelineConfig::default();

    for textures in [1, 2] {
        let mut tree = sprites(10_000, textures);
        let snapshot = SnapshotBuilder::default().build(&mut tree, 1, 0.0).expect("snapshot");
        let mut renderer = Renderer::new(RecordingDevice::counting(), &config, Telemetry::disabled());
        group.throughput(Throughput::Elements(snapshot.len() as u64));

        group.bench_with_input(BenchmarkId::new("textures", textures), &textures, |b, _| {
            b.iter(|| {
                black_box(renderer.draw_frame(&snapshot).ok());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_snapshot_build, bench_draw_pass);
criterion_main!(benches);
