use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use graspose_3d::{
    axes::classify_box_axes,
    normals::{estimate_normals, NormalEstimationParams},
    obb::compute_obb,
    pose::build_pose,
};

fn random_box(num_points: usize) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(7);
    let rotation = glam::DMat3::from_euler(glam::EulerRot::XYZ, 0.3, -0.2, 0.9);
    (0..num_points)
        .map(|_| {
            let p = glam::DVec3::new(
                rng.random_range(-0.1..0.1),
                rng.random_range(-0.05..0.05),
                rng.random_range(-0.02..0.02),
            );
            (rotation * p + glam::DVec3::new(0.0, 0.1, 0.8)).to_array()
        })
        .collect()
}

fn bench_obb(c: &mut Criterion) {
    let mut group = c.benchmark_group("obb");

    for num_points in [1_000, 10_000, 100_000] {
        let points = random_box(num_points);
        group.bench_with_input(
            BenchmarkId::new("compute_obb", num_points),
            &points,
            |b, points| {
                b.iter(|| black_box(compute_obb(points)));
            },
        );
    }
}

fn bench_normals(c: &mut Criterion) {
    let mut group = c.benchmark_group("normals");
    let params = NormalEstimationParams::default();

    for num_points in [1_000, 10_000] {
        let points = random_box(num_points);
        group.bench_with_input(
            BenchmarkId::new("estimate_normals", num_points),
            &points,
            |b, points| {
                b.iter(|| black_box(estimate_normals(points, &params)));
            },
        );
    }
}

fn bench_pose_from_box(c: &mut Criterion) {
    let points = random_box(5_000);
    c.bench_function("pose_from_box", |b| {
        b.iter(|| {
            let obb = compute_obb(black_box(&points)).ok()?;
            let axes = classify_box_axes(&obb).ok()?;
            build_pose(axes.facing.unit, axes.normal.unit, obb.center()).ok()
        });
    });
}

criterion_group!(benches, bench_obb, bench_normals, bench_pose_from_box);
criterion_main!(benches);
